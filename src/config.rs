use std::{env, str::FromStr};

use thiserror::Error;

use crate::diagnosis::DEFAULT_CONFIDENCE_THRESHOLD;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub model_path: String,
    pub class_indices_path: String,
    pub model_url: Option<String>,
    pub class_indices_url: Option<String>,
    pub model_input_op: String,
    pub model_output_op: String,
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub cors_origin: String,
    pub translation_enabled: bool,
    pub translate_url: String,
}

impl Settings {
    /// Reads settings from the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let body_limit_mb: usize = parse_or(&lookup, "BODY_LIMIT_MB", 5)?;

        Ok(Settings {
            port: parse_or(&lookup, "PORT", 8000)?,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            model_path: lookup("MODEL_PATH").unwrap_or_else(|| "./model/frozen_graph.pb".into()),
            class_indices_path: lookup("CLASS_INDICES_PATH")
                .unwrap_or_else(|| "./model/class_indices.json".into()),
            model_url: lookup("MODEL_URL").filter(|s| !s.is_empty()),
            class_indices_url: lookup("CLASS_INDICES_URL").filter(|s| !s.is_empty()),
            model_input_op: lookup("MODEL_INPUT_OP").unwrap_or_else(|| "x".into()),
            model_output_op: lookup("MODEL_OUTPUT_OP").unwrap_or_else(|| "Identity".into()),
            image_size: parse_or(&lookup, "IMAGE_SIZE", 224)?,
            confidence_threshold: parse_or(
                &lookup,
                "CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            )?,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".into()),
            translation_enabled: parse_or(&lookup, "TRANSLATION_ENABLED", true)?,
            translate_url: lookup("TRANSLATE_URL").unwrap_or_else(|| {
                "https://translate.googleapis.com/translate_a/single".into()
            }),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
