//! 存储上传服务 - 业务能力层
//!
//! 只负责"把一批本地文件放进存储桶"，逐个文件隔离失败，
//! 只有整批失败（存储桶不可访问 / 全部上传失败）才向上抛出。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{ConfigError, StorageError};
use crate::services::storage::{BucketProbe, ObjectStorage};
use crate::utils::logging::log_upload_summary;

/// 单个文件上传成功
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub uri: String,
    pub source_path: PathBuf,
}

/// 单个文件上传失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub source_path: PathBuf,
    pub error_detail: String,
}

/// 批次上传报告
///
/// `successes` 与 `failures` 恰好划分输入列表，顺序与输入一致
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub successes: Vec<UploadResult>,
    pub failures: Vec<UploadFailure>,
}

impl BatchReport {
    pub fn uris(&self) -> Vec<String> {
        self.successes.iter().map(|s| s.uri.clone()).collect()
    }
}

/// 存储上传服务
pub struct StorageUploader {
    storage: Arc<dyn ObjectStorage>,
}

impl StorageUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// 存储后端凭据是否齐全
    pub fn ensure_configured(&self) -> Result<(), ConfigError> {
        self.storage.ensure_configured()
    }

    /// 检查存储桶是否存在且有权限
    ///
    /// 三种失败原因分别记录日志，调用方只拿到布尔值
    pub async fn validate_access(&self, bucket: &str) -> bool {
        match self.storage.head_bucket(bucket).await {
            BucketProbe::Accessible => {
                info!("存储桶 '{}' 可访问", bucket);
                true
            }
            BucketProbe::Missing => {
                error!("存储桶 '{}' 不存在", bucket);
                false
            }
            BucketProbe::Forbidden => {
                error!("无权访问存储桶 '{}'", bucket);
                false
            }
            BucketProbe::Transient(detail) => {
                error!("访问存储桶 '{}' 出错: {}", bucket, detail);
                false
            }
        }
    }

    /// 上传单个文件，返回存储 URI
    ///
    /// URI 只在后端确认写入之后才生成
    pub async fn upload_one(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        skip_validation: bool,
    ) -> Result<String, StorageError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound {
                    path: local_path.display().to_string(),
                },
                _ => StorageError::Upload {
                    key: key.to_string(),
                    detail: format!("failed to stat {}: {}", local_path.display(), e),
                },
            })?;
        if !metadata.is_file() {
            return Err(StorageError::InvalidTarget {
                path: local_path.display().to_string(),
            });
        }

        if !skip_validation && !self.validate_access(bucket).await {
            return Err(StorageError::BucketInaccessible {
                bucket: bucket.to_string(),
            });
        }

        let uri = self.uri_for(bucket, key);
        info!("⬆️ 正在上传 '{}' 到 {}", file_name(local_path), uri);

        self.storage.put_file(bucket, key, local_path).await.map_err(|e| {
            error!("上传失败 {}: {}", uri, e);
            e
        })?;

        info!("✓ 上传成功: {}", uri);
        Ok(uri)
    }

    /// 批量上传，返回成功的 URI 列表
    ///
    /// 失败的文件只记录在日志中；需要失败明细请使用 [`Self::upload_batch_report`]
    pub async fn upload_batch(
        &self,
        local_paths: &[PathBuf],
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError> {
        Ok(self.upload_batch_report(local_paths, bucket, prefix).await?.uris())
    }

    /// 批量上传，返回完整的成功 / 失败报告
    ///
    /// - 整批只验证一次存储桶，不可访问时不尝试任何上传
    /// - 对象键为 `prefix + 文件名`，不检测重名：同名文件后写覆盖先写
    /// - 单个文件失败不影响其它文件
    /// - 输入非空且全部失败时返回 `AllUploadsFailed`
    pub async fn upload_batch_report(
        &self,
        local_paths: &[PathBuf],
        bucket: &str,
        prefix: &str,
    ) -> Result<BatchReport, StorageError> {
        if !self.validate_access(bucket).await {
            return Err(StorageError::BucketInaccessible {
                bucket: bucket.to_string(),
            });
        }

        let prefix = normalize_prefix(prefix);
        let mut report = BatchReport::default();

        for local_path in local_paths {
            let key = object_key(&prefix, local_path);
            match self.upload_one(local_path, bucket, &key, true).await {
                Ok(uri) => report.successes.push(UploadResult {
                    uri,
                    source_path: local_path.clone(),
                }),
                Err(e) => {
                    error!("上传 {} 失败: {}", local_path.display(), e);
                    report.failures.push(UploadFailure {
                        source_path: local_path.clone(),
                        error_detail: e.to_string(),
                    });
                }
            }
        }

        let failed: Vec<(String, String)> = report
            .failures
            .iter()
            .map(|f| (f.source_path.display().to_string(), f.error_detail.clone()))
            .collect();
        log_upload_summary(report.successes.len(), &failed);

        if report.successes.is_empty() && !local_paths.is_empty() {
            return Err(StorageError::AllUploadsFailed {
                attempted: local_paths.len(),
            });
        }
        Ok(report)
    }

    /// 删除对象，尽力而为，从不抛出错误
    pub async fn delete(&self, bucket: &str, key: &str) -> bool {
        let uri = self.uri_for(bucket, key);
        info!("删除 {}", uri);
        match self.storage.delete_object(bucket, key).await {
            Ok(()) => {
                info!("✓ 已删除 {}", uri);
                true
            }
            Err(e) => {
                warn!("删除 {} 失败: {}", uri, e);
                false
            }
        }
    }

    fn uri_for(&self, bucket: &str, key: &str) -> String {
        format!("{}://{}/{}", self.storage.scheme(), bucket, key)
    }
}

/// 非空前缀统一以 `/` 结尾
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// 对象键 = 前缀 + 文件名
pub fn object_key(normalized_prefix: &str, local_path: &Path) -> String {
    format!("{}{}", normalized_prefix, file_name(local_path))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}
