//! 查看器救援工具
//!
//! 代理点击文档链接时，页面有时会在浏览器内置的 PDF 查看器里打开，
//! 而不是触发下载。代理调用本工具把当前显示的文档强制保存到下载目录。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::tools::AgentTool;
use crate::services::downloads;

pub const RESCUE_TOOL_NAME: &str = "save_viewer_document";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 救援结果，原样回传给代理
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueResult {
    pub success: bool,
    pub filename: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
}

impl RescueResult {
    fn saved(path: &Path) -> Self {
        Self {
            success: true,
            filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            size_bytes: std::fs::metadata(path).ok().map(|m| m.len()),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            size_bytes: None,
            error: Some(error.into()),
        }
    }
}

/// 定位到的查看器页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerHandle {
    pub url: String,
}

/// 救援工具依赖的浏览器能力
#[async_trait]
pub trait ViewerHost: Send + Sync {
    /// 浏览器会话是否仍然可用
    async fn is_active(&self) -> bool;

    /// 查找地址与 `url_hint` 完全一致的页面，找不到时退回最近打开的页面
    async fn find_viewer(&self, url_hint: &str) -> anyhow::Result<Option<ViewerHandle>>;

    /// 触发原生"另存为"并等待保存完成事件
    ///
    /// 返回保存后的文件名；没有观察到完成事件时返回 `None`
    async fn save_document(&self, viewer: &ViewerHandle) -> anyhow::Result<Option<String>>;
}

/// 查看器救援工具
pub struct ViewerRescueTool {
    host: Arc<dyn ViewerHost>,
    download_dir: PathBuf,
    save_timeout: Duration,
    grace: Duration,
}

impl ViewerRescueTool {
    pub fn new(
        host: Arc<dyn ViewerHost>,
        download_dir: impl Into<PathBuf>,
        save_timeout: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            host,
            download_dir: download_dir.into(),
            save_timeout,
            grace,
        }
    }

    /// 保存 `url_hint` 对应页面中显示的文档，从不返回错误
    pub async fn rescue(&self, url_hint: &str) -> RescueResult {
        info!("🛟 救援查看器文档: {}", url_hint);

        if !self.host.is_active().await {
            warn!("没有活动的浏览器会话");
            return RescueResult::failed("no active browser session");
        }

        let viewer = match self.host.find_viewer(url_hint).await {
            Ok(Some(viewer)) => viewer,
            Ok(None) => {
                warn!("没有找到匹配的页面: {}", url_hint);
                return RescueResult::failed(format!("no matching page for {}", url_hint));
            }
            Err(e) => {
                warn!("查找页面失败: {}", e);
                return RescueResult::failed(format!("failed to locate page: {}", e));
            }
        };

        let baseline = pdf_mtimes(&self.download_dir);
        let mut trigger_error = None;

        match timeout(self.save_timeout, self.host.save_document(&viewer)).await {
            Ok(Ok(Some(filename))) => {
                let path = self.download_dir.join(&filename);
                if downloads::is_pdf(&path) && path.is_file() {
                    info!("✓ 文档已保存: {}", filename);
                    return RescueResult::saved(&path);
                }
                debug!("保存事件的文件名 {} 不在下载目录中，改为轮询目录", filename);
            }
            Ok(Ok(None)) => debug!("没有观察到保存事件，改为轮询目录"),
            Ok(Err(e)) => {
                warn!("触发保存失败: {}", e);
                trigger_error = Some(e.to_string());
            }
            Err(_) => warn!(
                "等待保存事件超时 ({}s)，改为轮询目录",
                self.save_timeout.as_secs_f32()
            ),
        }

        let deadline = Instant::now() + self.grace;
        loop {
            if let Some(path) = newest_since(&self.download_dir, &baseline) {
                info!("✓ 在下载目录中找到新文档: {}", path.display());
                return RescueResult::saved(&path);
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(POLL_INTERVAL).await;
        }

        let message = match trigger_error {
            Some(e) => format!("save trigger failed and no new PDF appeared: {}", e),
            None => "timed out waiting for the document to be saved".to_string(),
        };
        warn!("救援失败: {}", message);
        RescueResult::failed(message)
    }
}

#[async_trait]
impl AgentTool for ViewerRescueTool {
    fn name(&self) -> &str {
        RESCUE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Save the PDF currently shown in an in-browser viewer tab to the download folder. \
         Pass the viewer tab's URL as url_hint. Call it again until it reports success."
    }

    fn input_example(&self) -> JsonValue {
        json!({ "url_hint": "https://example.gov/docs/solicitation.pdf" })
    }

    async fn invoke(&self, input: JsonValue) -> JsonValue {
        let url_hint = input
            .get("url_hint")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let result = self.rescue(url_hint).await;
        serde_json::to_value(&result)
            .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
    }
}

fn pdf_mtimes(directory: &Path) -> HashMap<PathBuf, SystemTime> {
    downloads::list_downloaded(directory)
        .into_iter()
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((path, modified))
        })
        .collect()
}

/// 相对基线新增或被改写的 PDF 中，修改时间最新的一个
fn newest_since(directory: &Path, baseline: &HashMap<PathBuf, SystemTime>) -> Option<PathBuf> {
    pdf_mtimes(directory)
        .into_iter()
        .filter(|(path, modified)| match baseline.get(path) {
            Some(before) => modified > before,
            None => true,
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可编排行为的假浏览器
    struct FakeHost {
        active: bool,
        pages: Vec<String>,
        dir: PathBuf,
        /// save_document 时写入目录的文件名
        writes: Option<&'static str>,
        /// 是否上报保存完成事件
        reports_event: bool,
        /// save_document 阻塞的时间
        delay: Duration,
        save_calls: AtomicUsize,
    }

    impl FakeHost {
        fn new(dir: &Path) -> Self {
            Self {
                active: true,
                pages: vec!["https://example.gov/event/1".into()],
                dir: dir.to_path_buf(),
                writes: None,
                reports_event: false,
                delay: Duration::ZERO,
                save_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ViewerHost for FakeHost {
        async fn is_active(&self) -> bool {
            self.active
        }

        async fn find_viewer(&self, url_hint: &str) -> anyhow::Result<Option<ViewerHandle>> {
            let url = self
                .pages
                .iter()
                .find(|p| p.as_str() == url_hint)
                .or_else(|| self.pages.last());
            Ok(url.map(|url| ViewerHandle { url: url.clone() }))
        }

        async fn save_document(&self, _viewer: &ViewerHandle) -> anyhow::Result<Option<String>> {
            self.save_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(name) = self.writes {
                std::fs::write(self.dir.join(name), b"%PDF-1.7")?;
            }
            sleep(self.delay).await;
            Ok(if self.reports_event {
                self.writes.map(str::to_string)
            } else {
                None
            })
        }
    }

    fn tool(host: FakeHost, dir: &Path) -> (Arc<FakeHost>, ViewerRescueTool) {
        let host = Arc::new(host);
        let tool = ViewerRescueTool::new(
            host.clone(),
            dir,
            Duration::from_millis(200),
            Duration::from_millis(300),
        );
        (host, tool)
    }

    #[tokio::test]
    async fn test_no_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new(dir.path());
        host.active = false;
        let (host, tool) = tool(host, dir.path());

        let result = tool.rescue("https://example.gov/event/1").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no active browser session"));
        assert_eq!(host.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_matching_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new(dir.path());
        host.pages.clear();
        let (_, tool) = tool(host, dir.path());

        let result = tool.rescue("https://example.gov/viewer").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no matching page"));
    }

    #[tokio::test]
    async fn test_save_event_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new(dir.path());
        host.writes = Some("addendum.pdf");
        host.reports_event = true;
        let (_, tool) = tool(host, dir.path());

        let result = tool.rescue("https://example.gov/event/1").await;
        assert_eq!(
            result,
            RescueResult {
                success: true,
                filename: Some("addendum.pdf".into()),
                size_bytes: Some(8),
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_directory_polling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.pdf"), b"old").unwrap();
        let mut host = FakeHost::new(dir.path());
        host.writes = Some("viewer.pdf");
        host.reports_event = false;
        // 不匹配的 hint 退回到最近打开的页面
        let (host, tool) = tool(host, dir.path());

        let result = tool.rescue("https://example.gov/unknown").await;
        assert!(result.success);
        assert_eq!(result.filename.as_deref(), Some("viewer.pdf"));
        assert_eq!(host.save_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_timeout_still_salvages_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new(dir.path());
        host.writes = Some("slow.pdf");
        host.reports_event = true;
        host.delay = Duration::from_secs(5);
        let (_, tool) = tool(host, dir.path());

        let result = tool.rescue("https://example.gov/event/1").await;
        assert!(result.success);
        assert_eq!(result.filename.as_deref(), Some("slow.pdf"));
    }

    #[tokio::test]
    async fn test_timeout_without_new_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.pdf"), b"old").unwrap();
        let (_, tool) = tool(FakeHost::new(dir.path()), dir.path());

        let result = tool.rescue("https://example.gov/event/1").await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("timed out waiting for the document to be saved")
        );
    }

    #[tokio::test]
    async fn test_invoke_as_agent_tool() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FakeHost::new(dir.path());
        host.writes = Some("package.pdf");
        host.reports_event = true;
        let (_, tool) = tool(host, dir.path());

        let output = tool
            .invoke(json!({ "url_hint": "https://example.gov/event/1" }))
            .await;
        let result: RescueResult = serde_json::from_value(output).unwrap();
        assert!(result.success);
        assert_eq!(result.filename.as_deref(), Some("package.pdf"));
        assert_eq!(tool.name(), RESCUE_TOOL_NAME);
    }
}
