use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    chatbot::{Chatbot, APOLOGY_REPLY},
    diagnosis::{diagnose, Diagnosis},
    error::AppError,
    fertilizer::shops_for,
    model::{Model, ModelError},
};

#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<Model>>,
    pub chatbot: Arc<Chatbot>,
    pub confidence_threshold: f32,
}

pub struct RouterOptions<'a> {
    pub body_limit_bytes: usize,
    pub cors_origin: &'a str,
}

pub fn build_router(state: AppState, options: RouterOptions<'_>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict", post(predict_handler))
        .route("/chat", post(chat_handler))
        .route("/fertilizer/shops", get(shops_handler))
        .layer(DefaultBodyLimit::max(options.body_limit_bytes))
        .layer(cors_layer(options.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!("CORS_ORIGIN {:?} is not a valid origin, cross-origin requests will be refused", origin);
            layer
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Agri Doctor Backend Running" }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "model_loaded": state.model.is_some(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(AppError::BadRequest("No file uploaded".to_string()))
}

fn run_diagnosis(
    model: Option<&Model>,
    image_data: &[u8],
    threshold: f32,
) -> Result<Diagnosis, AppError> {
    let Some(model) = model else {
        image::load_from_memory(image_data)
            .map_err(|e| AppError::BadRequest(format!("Processing failed: {}", e)))?;
        tracing::warn!("Prediction requested but no model is loaded");
        return Ok(Diagnosis::model_unavailable());
    };

    match model.predict(image_data) {
        Ok(predictions) => {
            let diagnosis = diagnose(&predictions, threshold);
            tracing::info!(
                disease = %diagnosis.disease,
                confidence = diagnosis.confidence,
                "Prediction served"
            );
            Ok(diagnosis)
        }
        Err(ModelError::Image(e)) => Err(AppError::BadRequest(format!("Processing failed: {}", e))),
        Err(e) => {
            tracing::error!("Prediction error: {}", e);
            Ok(Diagnosis::failed(e))
        }
    }
}

#[tracing::instrument(skip_all)]
async fn predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Diagnosis>, AppError> {
    let image_data = read_upload(&mut multipart).await?;
    tracing::debug!(bytes = image_data.len(), "Received upload");

    if image_data.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    }

    let model = state.model.clone();
    let threshold = state.confidence_threshold;
    let diagnosis = tokio::task::spawn_blocking(move || {
        run_diagnosis(model.as_deref(), &image_data, threshold)
    })
    .await??;

    Ok(Json(diagnosis))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[tracing::instrument(skip_all)]
async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<Value> {
    let reply = match payload {
        Ok(Json(request)) => state.chatbot.reply(&request.message).await,
        Err(rejection) => {
            tracing::warn!("Unreadable chat request: {}", rejection);
            APOLOGY_REPLY.to_string()
        }
    };
    Json(json!({ "reply": reply }))
}

#[derive(Debug, Deserialize)]
struct ShopsQuery {
    city: Option<String>,
}

async fn shops_handler(Query(query): Query<ShopsQuery>) -> Result<Json<Value>, AppError> {
    let city = query
        .city
        .ok_or_else(|| AppError::BadRequest("city query parameter is required".to_string()))?;
    Ok(Json(json!({ "shops": shops_for(&city) })))
}
