//! 单次提取编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **前置检查**：代理凭据缺失时在创建浏览器之前失败
//! 2. **清空目录**：每次运行前清空下载目录
//! 3. **懒加载会话**：代理会话（浏览器 + 工具）每个编排器只创建一次
//! 4. **限时运行**：代理运行受 `run_timeout` 限制，超时视为提前停止
//! 5. **以文件为准**：代理的结论仅供参考，结果以下载目录中的 PDF 为准
//!
//! 编排器只通过 `downloads::clear` 删除文件，失败时已下载的文件留在磁盘上。
//! 未经 `close` 就被丢弃（例如请求被取消）时，会话在后台任务中释放。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::agent::{AgentFactory, AgentSession, SiteLogin, TaskDirective};
use crate::config::Config;
use crate::error::{AppResult, ExtractionFailure};
use crate::services::downloads;

/// 提取编排器
pub struct ExtractionOrchestrator {
    config: Config,
    factory: Arc<dyn AgentFactory>,
    download_dir: PathBuf,
    run_timeout: Duration,
    session: Option<AgentSession>,
}

impl ExtractionOrchestrator {
    /// 创建编排器
    ///
    /// 先检查代理凭据，再创建下载目录；两者都不会启动浏览器
    pub fn new(
        config: Config,
        factory: Arc<dyn AgentFactory>,
        download_dir: impl Into<PathBuf>,
    ) -> AppResult<Self> {
        config.require_agent_credentials()?;

        let download_dir = download_dir.into();
        downloads::ensure(&download_dir).with_context(|| {
            format!(
                "failed to create download directory {}",
                download_dir.display()
            )
        })?;

        Ok(Self {
            run_timeout: config.run_timeout(),
            config,
            factory,
            download_dir,
            session: None,
        })
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 代理会话是否已经创建
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// 从 `url` 提取所有 PDF，返回下载目录中的文件（按文件名排序）
    ///
    /// 没有下载到文件时返回空列表而不是错误，也不会自动重试
    pub async fn run(&mut self, url: &str) -> AppResult<Vec<PathBuf>> {
        downloads::clear(&self.download_dir);

        let session = match self.session.take() {
            Some(session) => session,
            None => {
                info!("🚀 创建导航代理会话...");
                self.factory
                    .create(&self.download_dir)
                    .await
                    .map_err(|e| ExtractionFailure {
                        url: url.to_string(),
                        cause: format!("{:#}", e),
                        salvaged: Vec::new(),
                    })?
            }
        };
        let session = self.session.insert(session);

        let directive =
            TaskDirective::new(url, &self.download_dir).with_login(site_login(&self.config));

        info!("🤖 导航代理开始处理: {}", url);
        let outcome = timeout(
            self.run_timeout,
            session.agent.run_task(&directive, &session.tools),
        )
        .await;

        // 无论代理怎么说，都以磁盘上的文件为准
        let files = downloads::collect_downloaded(&self.download_dir);

        match outcome {
            Ok(Ok(verdict)) => info!("代理结论（仅供参考）: {}", verdict),
            Ok(Err(e)) => {
                error!("❌ 导航代理失败: {:#}", e);
                return Err(ExtractionFailure {
                    url: url.to_string(),
                    cause: format!("{:#}", e),
                    salvaged: files,
                }
                .into());
            }
            Err(_) => warn!(
                "⏱️ 导航代理运行超过 {}s，提前停止",
                self.run_timeout.as_secs_f32()
            ),
        }

        if files.is_empty() {
            warn!("⚠️ 没有下载到任何 PDF: {}", url);
        } else {
            info!("✓ 共获得 {} 个 PDF", files.len());
        }
        Ok(files)
    }

    /// 释放代理会话；会话从未创建时也可以调用，可重复调用
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.agent.close().await;
            info!("导航代理会话已释放");
        }
    }
}

impl Drop for ExtractionOrchestrator {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("编排器未关闭即被丢弃，后台释放代理会话");
                handle.spawn(async move {
                    session.agent.close().await;
                    info!("导航代理会话已释放");
                });
            }
            Err(_) => warn!("没有可用的 tokio 运行时，代理会话未能释放"),
        }
    }
}

fn site_login(config: &Config) -> Option<SiteLogin> {
    match (&config.site_username, &config.site_password) {
        (Some(username), Some(password)) => Some(SiteLogin {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fake::{FakeBehavior, FakeFactory};
    use crate::error::{AppError, ConfigError};
    use std::fs;
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            llm_api_key: "test-key".into(),
            ..Config::default()
        }
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_session() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(FakeBehavior::writes(&["a.pdf"])));

        let result = ExtractionOrchestrator::new(
            Config::default(),
            factory.clone(),
            temp.path().join("downloads"),
        );

        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::MissingCredential { .. }))
        ));
        assert_eq!(factory.created(), 0);
        assert!(!temp.path().join("downloads").exists());
    }

    #[tokio::test]
    async fn test_filesystem_is_the_truth_regardless_of_verdict() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(
            FakeBehavior::writes(&["c.PDF", "a.pdf", "B.pdf", "readme.txt"]).claiming(false),
        ));
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory.clone(), temp.path()).unwrap();

        let files = orchestrator.run("https://example.gov/event/1").await.unwrap();
        orchestrator.close().await;

        assert_eq!(names(&files), vec!["B.pdf", "a.pdf", "c.PDF"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[tokio::test]
    async fn test_stale_files_are_cleared_and_session_reused() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stale.pdf"), b"%PDF old").unwrap();
        let factory = Arc::new(FakeFactory::new(FakeBehavior::writes(&["fresh.pdf"])));
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory.clone(), temp.path()).unwrap();

        let first = orchestrator.run("https://example.gov/1").await.unwrap();
        let second = orchestrator.run("https://example.gov/2").await.unwrap();

        assert_eq!(names(&first), vec!["fresh.pdf"]);
        assert_eq!(names(&second), vec!["fresh.pdf"]);
        assert_eq!(factory.created(), 1);
        assert_eq!(
            factory.directive_urls(),
            vec!["https://example.gov/1", "https://example.gov/2"]
        );
    }

    #[tokio::test]
    async fn test_timeout_with_nothing_saved_is_empty() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(
            FakeBehavior::writes(&[]).sleeping(Duration::from_secs(30)),
        ));
        let mut orchestrator = ExtractionOrchestrator::new(config(), factory.clone(), temp.path())
            .unwrap()
            .with_run_timeout(Duration::from_millis(50));

        let files = orchestrator.run("https://example.gov/slow").await.unwrap();
        assert!(files.is_empty());

        orchestrator.close().await;
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_timeout_keeps_files_written_so_far() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(
            FakeBehavior::writes(&["early.pdf"]).sleeping(Duration::from_secs(30)),
        ));
        let mut orchestrator = ExtractionOrchestrator::new(config(), factory, temp.path())
            .unwrap()
            .with_run_timeout(Duration::from_millis(50));

        let files = orchestrator.run("https://example.gov/slow").await.unwrap();
        assert_eq!(names(&files), vec!["early.pdf"]);
    }

    #[tokio::test]
    async fn test_agent_error_reports_salvaged_files() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(
            FakeBehavior::writes(&["partial.pdf"]).failing("browser crashed"),
        ));
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory, temp.path()).unwrap();

        let err = orchestrator.run("https://example.gov/x").await.unwrap_err();
        match err {
            AppError::Navigation(failure) => {
                assert_eq!(failure.url, "https://example.gov/x");
                assert!(failure.cause.contains("browser crashed"));
                assert_eq!(names(&failure.salvaged), vec!["partial.pdf"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // 失败时文件留在磁盘上
        assert!(temp.path().join("partial.pdf").exists());
    }

    #[tokio::test]
    async fn test_factory_failure_is_navigation_failure() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(FakeBehavior::writes(&[])).failing_to_create());
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory.clone(), temp.path()).unwrap();

        let err = orchestrator.run("https://example.gov").await.unwrap_err();
        assert!(matches!(err, AppError::Navigation(_)));
        assert!(!orchestrator.has_session());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_safe_without_session() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(FakeBehavior::writes(&["a.pdf"])));
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory.clone(), temp.path()).unwrap();

        orchestrator.close().await;
        assert_eq!(factory.closed(), 0);

        orchestrator.run("https://example.gov").await.unwrap();
        orchestrator.close().await;
        orchestrator.close().await;
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_close_releases_session() {
        let temp = TempDir::new().unwrap();
        let factory = Arc::new(FakeFactory::new(FakeBehavior::writes(&["a.pdf"])));
        let mut orchestrator =
            ExtractionOrchestrator::new(config(), factory.clone(), temp.path()).unwrap();

        orchestrator.run("https://example.gov").await.unwrap();
        drop(orchestrator);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(factory.closed(), 1);
    }

    #[test]
    fn test_site_login_requires_both_fields() {
        let partial = Config {
            site_username: Some("buyer".into()),
            ..Config::default()
        };
        assert!(site_login(&partial).is_none());

        let full = Config {
            site_username: Some("buyer".into()),
            site_password: Some("pw".into()),
            ..Config::default()
        };
        assert_eq!(site_login(&full).unwrap().username, "buyer");
    }
}
