//! HTTP 接口层
//!
//! 负责把外部请求转换为 `ExtractionJob`，并把结果或错误转换为 JSON 响应

pub mod error;
pub mod models;
pub mod routes;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::orchestrator::ExtractionPipeline;

pub use error::ApiError;
pub use models::{ExtractionRequest, HealthResponse, ServiceInfo};
pub use routes::router;

/// 绑定地址并运行服务，直到收到 Ctrl+C
pub async fn serve(pipeline: Arc<ExtractionPipeline>, address: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("🌐 API 服务已启动: http://{}", listener.local_addr()?);

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("api server stopped unexpectedly")?;

    info!("API 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("收到退出信号，正在关闭...");
    }
}
