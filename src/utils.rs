use std::{env, path::Path};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use thiserror::Error;

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn download_headers() -> HeaderMap {
    let mut header_map = HeaderMap::new();

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                header_map.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("GITHUB_TOKEN is not a valid header value, ignoring it"),
        }
    }
    header_map.insert(
        ACCEPT,
        HeaderValue::from_static("application/octet-stream"),
    );

    header_map
}

async fn download_file(url: &str, path: &str) -> Result<(), DownloadError> {
    tracing::info!("Downloading {} from {}", path, url);

    let response = reqwest::Client::new()
        .get(url)
        .headers(download_headers())
        .send()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;

    let write_err = |source| DownloadError::Write {
        path: path.to_string(),
        source,
    };
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    write_atomically(path, &bytes).await.map_err(write_err)
}

/// Writes next to `path` first so an interrupted write never leaves a truncated file behind.
async fn write_atomically(path: &str, contents: &[u8]) -> std::io::Result<()> {
    let partial = format!("{}.tmp", path);
    if let Err(err) = tokio::fs::write(&partial, contents).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(err);
    }
    tokio::fs::rename(&partial, path).await
}

async fn ensure_file(path: &str, url: Option<&str>) -> Result<(), DownloadError> {
    if Path::new(path).exists() {
        return Ok(());
    }
    match url {
        Some(url) => download_file(url, path).await,
        None => {
            tracing::warn!("Missing: {} (no download URL configured)", path);
            Ok(())
        }
    }
}

/// Fetches the model graph and class indices when they are missing locally
/// and a download URL is configured for them.
pub async fn ensure_files_exist(settings: &Settings) -> Result<(), DownloadError> {
    tracing::info!("Checking model files...");
    ensure_file(&settings.model_path, settings.model_url.as_deref()).await?;
    ensure_file(
        &settings.class_indices_path,
        settings.class_indices_url.as_deref(),
    )
    .await
}
