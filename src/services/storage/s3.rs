//! 基于 `object_store` 的 S3 后端

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use tracing::{debug, warn};

use super::{BucketProbe, ObjectStorage};
use crate::config::Config;
use crate::error::{ConfigError, StorageError};

/// S3 存储后端
///
/// 每个存储桶对应一个 `AmazonS3` 客户端，在本实例的生命周期内缓存。
/// 凭据缺失时仍可创建，但每次请求都会在 `ensure_configured` 处失败
pub struct S3Storage {
    credentials: Result<(String, String), ConfigError>,
    region: String,
    endpoint: Option<String>,
    clients: Mutex<HashMap<String, Arc<AmazonS3>>>,
}

impl S3Storage {
    pub fn new(config: &Config) -> Self {
        let credentials = config
            .require_storage_credentials()
            .map(|(key_id, secret)| (key_id.to_string(), secret.to_string()));
        match &credentials {
            Ok(_) => debug!("S3 后端初始化, region: {}", config.storage_region),
            Err(e) => warn!("S3 后端未配置: {}", e),
        }
        Self {
            credentials,
            region: config.storage_region.clone(),
            endpoint: config.storage_endpoint.clone(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, bucket: &str) -> Result<Arc<AmazonS3>, StorageError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| StorageError::Backend("client cache lock poisoned".into()))?;
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }

        let (access_key_id, secret_access_key) = self
            .credentials
            .as_ref()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key);
        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let client = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        );
        clients.insert(bucket.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn ensure_configured(&self) -> Result<(), ConfigError> {
        self.credentials.as_ref().map(|_| ()).map_err(Clone::clone)
    }

    async fn head_bucket(&self, bucket: &str) -> BucketProbe {
        let client = match self.client(bucket) {
            Ok(client) => client,
            Err(e) => return BucketProbe::Transient(e.to_string()),
        };

        // 列出根目录即可验证存储桶存在且有读权限
        match client.list_with_delimiter(None).await {
            Ok(_) => BucketProbe::Accessible,
            Err(e) => classify_probe_error(e),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let client = self.client(bucket)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                detail: format!("failed to read {}: {}", local_path.display(), e),
            })?;

        client
            .put(&ObjectPath::from(key), PutPayload::from(data))
            .await
            .map_err(|e| map_transfer_error(bucket, key, e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let client = self.client(bucket)?;
        client
            .delete(&ObjectPath::from(key))
            .await
            .map_err(|e| map_transfer_error(bucket, key, e))
    }
}

fn classify_probe_error(err: object_store::Error) -> BucketProbe {
    match &err {
        object_store::Error::NotFound { .. } => BucketProbe::Missing,
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. } => {
            BucketProbe::Forbidden
        }
        // 列表请求的错误只以 Generic 形式返回，状态码和 S3 错误码只保留在错误文本里
        other => {
            let probe = classify_response_text(&error_chain_text(other));
            debug!("存储桶探测错误 {} 归类为 {}", other, probe);
            probe
        }
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// 从响应文本中识别 S3 错误码（`<Code>..</Code>`）或 HTTP 状态码
fn classify_response_text(text: &str) -> BucketProbe {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        Some((
            Regex::new(r"<Code>([^<]+)</Code>").ok()?,
            Regex::new(r"status (\d{3})").ok()?,
        ))
    });
    let Some((code_re, status_re)) = patterns else {
        return BucketProbe::Transient(text.to_string());
    };

    if let Some(code) = code_re.captures(text).map(|c| c[1].to_string()) {
        match code.as_str() {
            "NoSuchBucket" => return BucketProbe::Missing,
            "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId"
            | "SignatureDoesNotMatch" | "AccountProblem" => return BucketProbe::Forbidden,
            _ => {}
        }
    }
    match status_re.captures(text).map(|c| c[1].to_string()).as_deref() {
        Some("404") => BucketProbe::Missing,
        Some("401") | Some("403") => BucketProbe::Forbidden,
        _ => BucketProbe::Transient(text.to_string()),
    }
}

fn map_transfer_error(bucket: &str, key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. } => {
            StorageError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: err.to_string(),
            }
        }
        other => StorageError::Upload {
            key: key.to_string(),
            detail: other.to_string(),
        },
    }
}
