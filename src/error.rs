use std::path::PathBuf;

use thiserror::Error;

/// 应用程序错误类型
///
/// 错误消息会原样透传给 HTTP 调用方，所以统一使用英文
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（缺少凭据等），在创建任何资源之前失败
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// 导航代理执行失败
    #[error(transparent)]
    Navigation(#[from] ExtractionFailure),
    /// 对象存储错误
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// 浏览器相关错误
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    /// LLM 服务错误
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    /// 请求参数校验失败
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// 其他错误（用于包装第三方库错误）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 是否属于调用方可修正的错误（映射为 400）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::InvalidRequest(_)
                | AppError::Storage(StorageError::BucketInaccessible { .. })
        )
    }
}

/// 配置错误
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// 必需的凭据不存在
    #[error("{var_name} is required but not set")]
    MissingCredential { var_name: String },
    /// 配置文件加载失败
    #[error("failed to load config file {path}: {reason}")]
    FileLoadFailed { path: String, reason: String },
}

impl ConfigError {
    pub fn missing(var_name: impl Into<String>) -> Self {
        ConfigError::MissingCredential {
            var_name: var_name.into(),
        }
    }
}

/// 导航代理会话失败
///
/// `salvaged` 记录失败前已经落盘的文件，由调用方决定是否删除
#[derive(Debug, Error)]
#[error("failed to extract PDFs from {url}: {cause}")]
pub struct ExtractionFailure {
    pub url: String,
    pub cause: String,
    pub salvaged: Vec<PathBuf>,
}

/// 对象存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 存储桶不存在或无权访问，整个批次不做任何上传
    #[error("cannot access bucket: {bucket}")]
    BucketInaccessible { bucket: String },
    /// 本地文件不存在
    #[error("local file not found: {path}")]
    NotFound { path: String },
    /// 路径不是普通文件
    #[error("path is not a file: {path}")]
    InvalidTarget { path: String },
    /// 存储后端拒绝访问
    #[error("access denied to s3://{bucket}/{key}: {detail}")]
    AccessDenied {
        bucket: String,
        key: String,
        detail: String,
    },
    /// 单个文件上传失败
    #[error("upload of {key} failed: {detail}")]
    Upload { key: String, detail: String },
    /// 批次中所有文件都上传失败
    #[error("all {attempted} file uploads failed, check logs for details")]
    AllUploadsFailed { attempted: usize },
    /// 存储后端的其他错误
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),
    /// 连接浏览器失败
    #[error("failed to connect to browser on port {port}: {detail}")]
    ConnectionFailed { port: u16, detail: String },
    /// 没有可用的页面
    #[error("no open page in the browser session")]
    NoPage,
    /// 浏览器会话已关闭
    #[error("browser session is closed")]
    SessionClosed,
    /// CDP 命令或脚本执行失败
    #[error("browser command failed: {0}")]
    Command(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Command(err.to_string())
    }
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API call failed (model: {model}): {detail}")]
    ApiCallFailed { model: String, detail: String },
    /// 返回内容为空
    #[error("LLM returned empty content (model: {model})")]
    EmptyContent { model: String },
    /// 无法从响应中解析出动作
    #[error("cannot parse agent action from LLM response: {response}")]
    ActionParseFailed { response: String },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors() {
        assert!(AppError::from(ConfigError::missing("LLM_API_KEY")).is_validation());
        assert!(AppError::InvalidRequest("bad url".into()).is_validation());
        assert!(AppError::from(StorageError::BucketInaccessible {
            bucket: "b".into()
        })
        .is_validation());
    }

    #[test]
    fn test_server_errors() {
        let failure = ExtractionFailure {
            url: "https://example.com".into(),
            cause: "agent crashed".into(),
            salvaged: vec![],
        };
        assert!(!AppError::from(failure).is_validation());
        assert!(!AppError::from(StorageError::AllUploadsFailed { attempted: 3 }).is_validation());
    }

    #[test]
    fn test_messages_are_single_line() {
        let err = AppError::from(ExtractionFailure {
            url: "https://example.com/event/1".into(),
            cause: "timeout".into(),
            salvaged: vec![],
        });
        assert_eq!(
            err.to_string(),
            "failed to extract PDFs from https://example.com/event/1: timeout"
        );
        assert_eq!(
            AppError::from(ConfigError::missing("LLM_API_KEY")).to_string(),
            "configuration error: LLM_API_KEY is required but not set"
        );
    }
}
