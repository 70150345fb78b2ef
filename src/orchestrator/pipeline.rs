//! 提取流水线 - 编排层
//!
//! 一次请求的完整流程：
//!
//! ```text
//! 检查存储桶 → ExtractionOrchestrator::run → 关闭会话 → 批量上传 → 汇总结果
//! ```
//!
//! 每个请求使用独立的下载目录 `{download_dir}/{job_id}`，
//! 并发数由 Semaphore 限制。无论成功、失败还是请求被取消，都会关闭会话并清理本地目录。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::extraction::ExtractionOrchestrator;
use crate::agent::AgentFactory;
use crate::config::Config;
use crate::error::{AppResult, StorageError};
use crate::services::storage::ObjectStorage;
use crate::services::{downloads, StorageUploader};
use crate::utils::logging::log_extraction_start;

static JOB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 提取结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Partial,
    Empty,
    Failed,
}

/// 一次提取的最终结果，构造后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionOutcome {
    status: ExtractionStatus,
    files: Vec<String>,
    message: String,
}

impl ExtractionOutcome {
    pub fn success(files: Vec<String>) -> Self {
        Self {
            status: ExtractionStatus::Success,
            message: format!("Successfully extracted {} PDF files", files.len()),
            files,
        }
    }

    pub fn partial(files: Vec<String>, failed: usize) -> Self {
        Self {
            status: ExtractionStatus::Partial,
            message: format!(
                "Extracted {} PDF files; {} failed to upload",
                files.len(),
                failed
            ),
            files,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: ExtractionStatus::Empty,
            files: Vec::new(),
            message: "No PDF files were found on the page".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Failed,
            files: Vec::new(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> ExtractionStatus {
        self.status
    }

    /// 存储 URI，顺序与上传顺序一致
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 一次提取请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    pub url: String,
    pub bucket: String,
    pub prefix: String,
}

/// 提取流水线，跨请求共享
pub struct ExtractionPipeline {
    config: Config,
    factory: Arc<dyn AgentFactory>,
    uploader: StorageUploader,
    permits: Semaphore,
    run_timeout: Duration,
}

impl ExtractionPipeline {
    pub fn new(
        config: Config,
        factory: Arc<dyn AgentFactory>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            permits: Semaphore::new(config.max_concurrent_extractions.max(1)),
            run_timeout: config.run_timeout(),
            uploader: StorageUploader::new(storage),
            factory,
            config,
        }
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 执行一次提取
    pub async fn execute(&self, job: &ExtractionJob) -> AppResult<ExtractionOutcome> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| anyhow!("extraction queue closed: {}", e))?;

        let job_id = next_job_id();
        log_extraction_start(&job_id, &job.url, &job.bucket, &job.prefix);

        let job_dir = JobDir(self.config.download_dir.join(&job_id));
        let result = self.run_job(job, &job_dir.0).await;
        drop(job_dir);

        if let Ok(outcome) = &result {
            info!("📊 [{}] {:?}: {}", job_id, outcome.status(), outcome.message());
        }
        result
    }

    async fn run_job(&self, job: &ExtractionJob, job_dir: &Path) -> AppResult<ExtractionOutcome> {
        let mut orchestrator =
            ExtractionOrchestrator::new(self.config.clone(), self.factory.clone(), job_dir)?
                .with_run_timeout(self.run_timeout);

        // 存储不可用时不必启动浏览器
        self.uploader.ensure_configured()?;
        if !self.uploader.validate_access(&job.bucket).await {
            return Err(StorageError::BucketInaccessible {
                bucket: job.bucket.clone(),
            }
            .into());
        }

        let extracted = orchestrator.run(&job.url).await;
        orchestrator.close().await;
        let files: Vec<PathBuf> = extracted?;

        if files.is_empty() {
            return Ok(ExtractionOutcome::empty());
        }

        let report = self
            .uploader
            .upload_batch_report(&files, &job.bucket, &job.prefix)
            .await?;

        Ok(if report.failures.is_empty() {
            ExtractionOutcome::success(report.uris())
        } else {
            ExtractionOutcome::partial(report.uris(), report.failures.len())
        })
    }
}

/// 请求的下载目录，离开作用域时删除（包括请求被取消的情况）
struct JobDir(PathBuf);

impl Drop for JobDir {
    fn drop(&mut self) {
        downloads::clear(&self.0);
        downloads::remove_dir(&self.0);
        debug!("已清理下载目录: {}", self.0.display());
    }
}

fn next_job_id() -> String {
    format!(
        "{}-{}",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        JOB_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
