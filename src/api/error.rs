//! HTTP 错误映射
//!
//! 校验类错误 → 400，其余 → 500；响应体与成功响应同形，`status` 为 `failed`

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::error::AppError;
use crate::orchestrator::ExtractionOutcome;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AppError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.0.to_string();
        if status.is_server_error() {
            error!(%status, "❌ 提取失败: {}", message);
        } else {
            warn!(%status, "请求被拒绝: {}", message);
        }
        (status, Json(ExtractionOutcome::failed(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ExtractionFailure, StorageError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::from(ConfigError::missing("LLM_API_KEY")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(StorageError::BucketInaccessible {
                    bucket: "b".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(StorageError::AllUploadsFailed { attempted: 2 }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(ExtractionFailure {
                    url: "https://a.gov".into(),
                    cause: "boom".into(),
                    salvaged: vec![],
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }
}
