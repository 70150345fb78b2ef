//! 路由与处理函数

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::error::ApiError;
use super::models::{ExtractionRequest, HealthResponse, ServiceInfo, API_VERSION};
use crate::orchestrator::{ExtractionOutcome, ExtractionPipeline};

/// 构建 HTTP 路由
pub fn router(pipeline: Arc<ExtractionPipeline>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/extract", post(extract))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    info!("健康检查");
    Json(HealthResponse {
        status: "healthy",
        version: API_VERSION,
    })
}

/// `GET /`
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Agentic Document Extraction API",
        health: "/health",
        version: API_VERSION,
    })
}

/// `POST /extract`
pub async fn extract(
    State(pipeline): State<Arc<ExtractionPipeline>>,
    payload: Result<Json<ExtractionRequest>, JsonRejection>,
) -> Result<Json<ExtractionOutcome>, ApiError> {
    let Json(request) = payload?;
    info!("收到提取请求: {}", request.url);

    let job = request.into_job()?;
    let outcome = pipeline.execute(&job).await?;
    Ok(Json(outcome))
}
