use std::{net::SocketAddr, sync::Arc};

use agri_doctor::{
    chatbot::{Chatbot, GoogleTranslator, PassthroughTranslator, Translator},
    config::Settings,
    model::{ClassLabels, Model, ModelError, TfClassifier},
    routes::{build_router, AppState, RouterOptions},
    utils::ensure_files_exist,
};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_model(settings: &Settings) -> Result<Model, ModelError> {
    tracing::info!("Loading model from {}", settings.model_path);
    let classifier = TfClassifier::load(
        &settings.model_path,
        &settings.model_input_op,
        &settings.model_output_op,
    )?;
    let labels = ClassLabels::load(&settings.class_indices_path)?;

    let model = Model::new(Box::new(classifier), labels, settings.image_size);
    model.warm_up()?;
    Ok(model)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    init_tracing();

    if let Err(err) = ensure_files_exist(&settings).await {
        tracing::error!("Could not fetch model files: {}", err);
    }

    let model = match load_model(&settings) {
        Ok(model) => {
            tracing::info!(classes = model.labels().len(), "Model loaded");
            Some(Arc::new(model))
        }
        Err(err) => {
            tracing::error!("Error loading model: {}. Predictions will be unavailable.", err);
            None
        }
    };

    let translator: Arc<dyn Translator> = if settings.translation_enabled {
        Arc::new(GoogleTranslator::new(settings.translate_url.clone()))
    } else {
        Arc::new(PassthroughTranslator)
    };

    let state = AppState {
        model,
        chatbot: Arc::new(Chatbot::new(translator)),
        confidence_threshold: settings.confidence_threshold,
    };
    let app = build_router(
        state,
        RouterOptions {
            body_limit_bytes: settings.body_limit_bytes,
            cors_origin: &settings.cors_origin,
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {}", addr))?
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    Ok(())
}
