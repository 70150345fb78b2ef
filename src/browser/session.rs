//! 浏览器会话 - 基础设施层
//!
//! 唯一持有 `Browser` 的地方。代理和救援工具通过 `Arc<BrowserSession>` 共享同一个会话。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::{connect_to_browser, launch_browser};
use crate::agent::rescue::{ViewerHandle, ViewerHost};
use crate::config::Config;
use crate::error::BrowserError;
use crate::infrastructure::JsExecutor;

/// 在页面上触发"另存为"：用带 download 属性的链接指向当前文档
const SAVE_DOCUMENT_SCRIPT: &str = r#"
(() => {
    const a = document.createElement('a');
    a.href = location.href;
    a.download = decodeURIComponent(location.pathname.split('/').pop() || 'document.pdf');
    (document.body || document.documentElement).appendChild(a);
    a.click();
    a.remove();
    return true;
})()
"#;

/// 浏览器会话
pub struct BrowserSession {
    browser: Mutex<Option<Browser>>,
    handler_task: StdMutex<Option<JoinHandle<()>>>,
    /// 连接到外部浏览器时不关闭它
    owned: bool,
    download_dir: PathBuf,
    /// 页面首次被观察到的顺序，用来判断"最近打开的页面"
    seen: StdMutex<Vec<TargetId>>,
}

impl BrowserSession {
    /// 启动（或连接）浏览器，并把下载目录指向 `download_dir`
    pub async fn start(config: &Config, download_dir: &Path) -> Result<Self, BrowserError> {
        let (browser, mut handler, owned) = match config.browser_debug_port {
            Some(port) => {
                let (browser, handler) = connect_to_browser(port).await?;
                (browser, handler, false)
            }
            None => {
                let (browser, handler) = launch_browser(config).await?;
                (browser, handler, true)
            }
        };

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        let download_dir =
            std::fs::canonicalize(download_dir).unwrap_or_else(|_| download_dir.to_path_buf());
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().into_owned())
            .events_enabled(true)
            .build()
            .map_err(BrowserError::Command)?;
        browser.execute(behavior).await?;
        info!("✓ 浏览器下载目录: {}", download_dir.display());

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler_task: StdMutex::new(Some(handler_task)),
            owned,
            download_dir,
            seen: StdMutex::new(Vec::new()),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 打开新页面并导航
    pub async fn open(&self, url: &str) -> Result<JsExecutor, BrowserError> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::SessionClosed)?;
        let page = browser.new_page(url).await?;
        info!("已导航到: {}", url);
        Ok(JsExecutor::new(page))
    }

    /// 按首次出现顺序排列的所有页面
    pub async fn pages(&self) -> Result<Vec<Page>, BrowserError> {
        let pages = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::SessionClosed)?;
            browser.pages().await?
        };

        let mut seen = self
            .seen
            .lock()
            .map_err(|_| BrowserError::Command("page order lock poisoned".into()))?;
        for page in &pages {
            if !seen.contains(page.target_id()) {
                seen.push(page.target_id().clone());
            }
        }
        let mut pages = pages;
        pages.sort_by_key(|p| {
            seen.iter()
                .position(|id| id == p.target_id())
                .unwrap_or(usize::MAX)
        });
        Ok(pages)
    }

    /// 所有标签页的地址（按打开顺序）
    pub async fn tab_urls(&self) -> Result<Vec<String>, BrowserError> {
        let mut urls = Vec::new();
        for page in self.pages().await? {
            urls.push(page.url().await?.unwrap_or_default());
        }
        Ok(urls)
    }

    /// 地址完全匹配的页面；没有匹配时退回最近打开的页面
    pub async fn find_page(&self, url_hint: &str) -> Result<Option<JsExecutor>, BrowserError> {
        let pages = self.pages().await?;
        for page in pages.iter().rev() {
            if page.url().await?.as_deref() == Some(url_hint) {
                return Ok(Some(JsExecutor::new(page.clone())));
            }
        }
        debug!("没有地址为 {} 的页面，使用最近打开的页面", url_hint);
        Ok(pages.last().cloned().map(JsExecutor::new))
    }

    /// 关闭会话；可重复调用
    pub async fn close(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if self.owned {
                if let Err(e) = browser.close().await {
                    warn!("关闭浏览器失败: {}", e);
                }
                if let Err(e) = browser.wait().await {
                    warn!("等待浏览器进程退出失败: {}", e);
                }
            }
            info!("浏览器会话已关闭");
        }
        if let Ok(mut task) = self.handler_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl ViewerHost for BrowserSession {
    async fn is_active(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    async fn find_viewer(&self, url_hint: &str) -> anyhow::Result<Option<ViewerHandle>> {
        let Some(page) = self.find_page(url_hint).await? else {
            return Ok(None);
        };
        let url = page.url().await?.unwrap_or_default();
        Ok(Some(ViewerHandle { url }))
    }

    async fn save_document(&self, viewer: &ViewerHandle) -> anyhow::Result<Option<String>> {
        // 先订阅下载事件，再触发保存
        let (mut begins, mut progress) = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::SessionClosed)?;
            (
                browser.event_listener::<EventDownloadWillBegin>().await?,
                browser.event_listener::<EventDownloadProgress>().await?,
            )
        };

        let page = self
            .find_page(&viewer.url)
            .await?
            .ok_or(BrowserError::NoPage)?;
        page.bring_to_front().await?;
        page.eval(SAVE_DOCUMENT_SCRIPT)
            .await
            .context("failed to trigger document save")?;
        debug!("已触发保存: {}", viewer.url);

        let mut names: HashMap<String, String> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = begins.next() => {
                    debug!("下载开始: {} ({})", event.suggested_filename, event.guid);
                    names.insert(event.guid.clone(), event.suggested_filename.clone());
                }
                Some(event) = progress.next() => match event.state {
                    DownloadProgressState::Completed => {
                        let name = names
                            .remove(&event.guid)
                            .unwrap_or_else(|| event.guid.clone());
                        return Ok(Some(name));
                    }
                    DownloadProgressState::Canceled => {
                        warn!("下载被取消: {}", event.guid);
                        return Ok(None);
                    }
                    _ => {}
                },
                else => return Ok(None),
            }
        }
    }
}
