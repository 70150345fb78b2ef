//! 对象存储抽象
//!
//! 上传器只依赖这三个操作：探测存储桶、上传本地文件、删除对象。

mod memory;
mod s3;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{ConfigError, StorageError};

/// 存储桶探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketProbe {
    /// 存在且可访问
    Accessible,
    /// 不存在
    Missing,
    /// 存在但无权访问
    Forbidden,
    /// 暂时性错误（网络、限流等）
    Transient(String),
}

impl fmt::Display for BucketProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketProbe::Accessible => write!(f, "accessible"),
            BucketProbe::Missing => write!(f, "does not exist"),
            BucketProbe::Forbidden => write!(f, "access denied"),
            BucketProbe::Transient(detail) => write!(f, "transient error: {}", detail),
        }
    }
}

/// 对象存储后端
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// URI 协议前缀，例如 `s3`
    fn scheme(&self) -> &str {
        "s3"
    }

    /// 后端所需的凭据是否齐全
    fn ensure_configured(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// 轻量级的存在性 / 权限探测
    async fn head_bucket(&self, bucket: &str) -> BucketProbe;

    /// 上传本地文件，返回即代表后端已确认写入
    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// 删除对象
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
}
