//! 内存存储后端，用于测试
//!
//! 线程安全（`RwLock`），可以注入"无权限的存储桶"和"必然失败的对象键"

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{BucketProbe, ObjectStorage};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, HashMap<String, Vec<u8>>>,
    forbidden: HashSet<String>,
    failing_keys: HashSet<String>,
    put_calls: usize,
}

/// 内存存储后端
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带有若干空存储桶的后端
    pub fn with_buckets<'a>(buckets: impl IntoIterator<Item = &'a str>) -> Self {
        let storage = Self::new();
        for bucket in buckets {
            storage.create_bucket(bucket);
        }
        storage
    }

    pub fn create_bucket(&self, bucket: &str) {
        if let Ok(mut state) = self.state.write() {
            state.buckets.entry(bucket.to_string()).or_default();
        }
    }

    /// 存储桶存在但拒绝访问
    pub fn forbid_bucket(&self, bucket: &str) {
        if let Ok(mut state) = self.state.write() {
            state.buckets.entry(bucket.to_string()).or_default();
            state.forbidden.insert(bucket.to_string());
        }
    }

    /// 针对指定对象键的上传始终失败
    pub fn fail_key(&self, key: &str) {
        if let Ok(mut state) = self.state.write() {
            state.failing_keys.insert(key.to_string());
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .ok()?
            .buckets
            .get(bucket)?
            .get(key)
            .cloned()
    }

    /// 存储桶中的所有对象键（已排序）
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// 累计的上传尝试次数
    pub fn put_calls(&self) -> usize {
        self.state.read().map(|s| s.put_calls).unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn head_bucket(&self, bucket: &str) -> BucketProbe {
        let Ok(state) = self.state.read() else {
            return BucketProbe::Transient("lock poisoned".into());
        };
        if state.forbidden.contains(bucket) {
            BucketProbe::Forbidden
        } else if state.buckets.contains_key(bucket) {
            BucketProbe::Accessible
        } else {
            BucketProbe::Missing
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                detail: e.to_string(),
            })?;

        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        state.put_calls += 1;

        if state.forbidden.contains(bucket) {
            return Err(StorageError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
                detail: "bucket is forbidden".into(),
            });
        }
        if state.failing_keys.contains(key) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                detail: "injected failure".into(),
            });
        }
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::Backend(format!("no such bucket: {}", bucket)))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".into()))?;
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::Backend(format!("no such bucket: {}", bucket)))?;
        objects.remove(key);
        Ok(())
    }
}
