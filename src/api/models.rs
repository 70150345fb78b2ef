//! 请求 / 响应模型

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::orchestrator::ExtractionJob;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `POST /extract` 请求体，兼容 `s3_bucket` / `s3_prefix` 字段名
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRequest {
    pub url: String,
    #[serde(alias = "s3_bucket")]
    pub storage_bucket: String,
    #[serde(default, alias = "s3_prefix")]
    pub storage_prefix: String,
}

impl ExtractionRequest {
    /// 校验请求并转换为流水线任务
    pub fn into_job(self) -> Result<ExtractionJob, AppError> {
        let parsed = Url::parse(self.url.trim())
            .map_err(|e| AppError::InvalidRequest(format!("malformed url '{}': {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AppError::InvalidRequest(format!(
                "url must be an absolute http(s) address: {}",
                self.url
            )));
        }

        let bucket = self.storage_bucket.trim();
        if bucket.is_empty() {
            return Err(AppError::InvalidRequest(
                "storage_bucket must not be empty".to_string(),
            ));
        }

        Ok(ExtractionJob {
            url: parsed.to_string(),
            bucket: bucket.to_string(),
            prefix: self.storage_prefix.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /` 的服务说明
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub health: &'static str,
    pub version: &'static str,
}
