//! 基于 LLM 的浏览器导航代理
//!
//! 观察 → 决策 → 执行 循环：
//! 1. 给当前页面的可交互元素编号，连同标签页列表和历史一起发给模型
//! 2. 模型回复一个 JSON 动作
//! 3. 执行动作，把观察结果写入历史
//!
//! 步数受 `max_agent_steps` 限制。

use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::directive::TaskDirective;
use super::rescue::ViewerRescueTool;
use super::tools::ToolRegistry;
use super::{AgentFactory, AgentSession, AgentVerdict, NavigationAgent};
use crate::browser::BrowserSession;
use crate::config::Config;
use crate::error::{BrowserError, LlmError};
use crate::infrastructure::JsExecutor;
use crate::services::LlmService;
use crate::utils::logging::truncate_text;

const SYSTEM_PROMPT: &str = r#"You are a browser automation agent that retrieves documents from web pages.
On every turn you receive the task, the open tabs, the interactive elements of the active tab and your history.
Reply with exactly ONE JSON object and nothing else. Available actions:
{"action": "click", "index": <element index>}
{"action": "navigate", "url": "<absolute url>"}
{"action": "switch_tab", "url": "<url of an open tab>"}
{"action": "scroll"}
{"action": "wait", "seconds": <1-10>}
{"action": "tool", "name": "<tool name>", "input": {...}}
{"action": "done", "success": true|false, "summary": "<what you downloaded>"}"#;

/// 给可交互元素编号并返回页面快照
const SNAPSHOT_SCRIPT: &str = r#"
(() => {
    document.querySelectorAll('[data-agent-index]').forEach(el => el.removeAttribute('data-agent-index'));
    const selector = 'a, button, [role="button"], [role="tab"], [role="link"], input[type="button"], input[type="submit"]';
    const visible = Array.from(document.querySelectorAll(selector)).filter(el => {
        const rect = el.getBoundingClientRect();
        return rect.width > 0 && rect.height > 0;
    });
    const elements = visible.slice(0, 150).map((el, i) => {
        el.setAttribute('data-agent-index', String(i));
        const text = (el.innerText || el.value || el.getAttribute('aria-label') || el.title || '').trim();
        return {
            index: i,
            tag: el.tagName.toLowerCase(),
            text: text.replace(/\s+/g, ' ').slice(0, 80),
            href: el.href || null,
        };
    });
    return { url: location.href, title: document.title, elements };
})()
"#;

const SCROLL_SCRIPT: &str = "(() => { window.scrollBy(0, window.innerHeight * 0.8); return true; })()";

const CLICK_SETTLE: Duration = Duration::from_millis(1500);
const MAX_WAIT_SECS: u64 = 10;
const HISTORY_LIMIT: usize = 20;

/// 模型可以选择的动作
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    Click {
        index: usize,
    },
    Navigate {
        url: String,
    },
    SwitchTab {
        url: String,
    },
    Scroll,
    Wait {
        #[serde(default = "default_wait")]
        seconds: u64,
    },
    Tool {
        name: String,
        #[serde(default)]
        input: JsonValue,
    },
    Done {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        summary: String,
    },
}

fn default_wait() -> u64 {
    2
}

/// 页面快照
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<ElementInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementInfo {
    pub index: usize,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    pub href: Option<String>,
}

/// 从模型回复中解析动作
///
/// 接受纯 JSON、```json 代码块，或者夹在说明文字中的第一个 JSON 对象
pub fn parse_action(response: &str) -> Result<AgentAction, LlmError> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok());

    let trimmed = response.trim();
    let fenced = fence.as_ref().and_then(|re| re.captures(trimmed));
    let candidate = if let Some(caps) = fenced {
        caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed)
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => trimmed,
        }
    };

    serde_json::from_str(candidate).map_err(|_| LlmError::ActionParseFailed {
        response: truncate_text(trimmed, 200),
    })
}

/// 组装单步提示词
pub fn build_step_prompt(
    task: &str,
    snapshot: &PageSnapshot,
    tabs: &[String],
    history: &[String],
    tools: &ToolRegistry,
) -> String {
    let tabs = tabs
        .iter()
        .enumerate()
        .map(|(i, url)| format!("  [{}] {}", i, url))
        .collect::<Vec<_>>()
        .join("\n");

    let elements = if snapshot.elements.is_empty() {
        "  (no interactive elements; this may be an embedded document viewer)".to_string()
    } else {
        snapshot
            .elements
            .iter()
            .map(|e| match &e.href {
                Some(href) => format!("  [{}] <{}> {} -> {}", e.index, e.tag, e.text, href),
                None => format!("  [{}] <{}> {}", e.index, e.tag, e.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let history = if history.is_empty() {
        "  (none)".to_string()
    } else {
        history
            .iter()
            .map(|h| format!("  {}", h))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let tools = if tools.is_empty() {
        "  (none)".to_string()
    } else {
        tools.describe()
    };

    format!(
        "TASK:\n{task}\n\nTOOLS:\n{tools}\n\nOPEN TABS (oldest first):\n{tabs}\n\n\
         ACTIVE TAB: {url}\nTITLE: {title}\nELEMENTS:\n{elements}\n\n\
         HISTORY:\n{history}\n\nNext action (one JSON object):",
        task = task,
        tools = tools,
        tabs = tabs,
        url = snapshot.url,
        title = snapshot.title,
        elements = elements,
        history = history,
    )
}

fn click_script(index: usize) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector('[data-agent-index="{}"]');
    if (!el) return false;
    el.scrollIntoView({{ block: 'center' }});
    el.click();
    return true;
}})()"#,
        index
    )
}

/// 代理当前观察的标签页
///
/// `switch_tab` 之后停留在选中的页面；出现新标签页时跟随最近打开的页面
#[derive(Debug)]
struct TabFocus<Id> {
    focused: Option<Id>,
    known_tabs: usize,
}

impl<Id> Default for TabFocus<Id> {
    fn default() -> Self {
        Self {
            focused: None,
            known_tabs: 0,
        }
    }
}

impl<Id: PartialEq> TabFocus<Id> {
    fn focus(&mut self, id: Id) {
        self.focused = Some(id);
    }

    /// 在按打开顺序排列的 `tabs` 中选出要观察的位置
    fn select(&mut self, tabs: &[Id]) -> Option<usize> {
        if tabs.len() > self.known_tabs {
            self.focused = None;
        }
        self.known_tabs = tabs.len();
        self.focused
            .as_ref()
            .and_then(|id| tabs.iter().position(|tab| tab == id))
            .or_else(|| tabs.len().checked_sub(1))
    }
}

/// LLM 驱动的浏览器代理
pub struct LlmBrowserAgent {
    session: Arc<BrowserSession>,
    llm: LlmService,
    max_steps: usize,
}

impl LlmBrowserAgent {
    pub fn new(session: Arc<BrowserSession>, llm: LlmService, max_steps: usize) -> Self {
        Self {
            session,
            llm,
            max_steps: max_steps.max(1),
        }
    }

    async fn snapshot(&self, page: &JsExecutor) -> PageSnapshot {
        match page.eval_as::<PageSnapshot>(SNAPSHOT_SCRIPT).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("页面快照失败: {}", e);
                PageSnapshot {
                    url: page.url().await.ok().flatten().unwrap_or_default(),
                    ..PageSnapshot::default()
                }
            }
        }
    }

    /// 本步要观察的页面
    async fn observed_page(
        &self,
        focus: &mut TabFocus<TargetId>,
    ) -> Result<JsExecutor, BrowserError> {
        let pages = self.session.pages().await?;
        let ids: Vec<TargetId> = pages.iter().map(|p| p.target_id().clone()).collect();
        focus
            .select(&ids)
            .and_then(|index| pages.into_iter().nth(index))
            .map(JsExecutor::new)
            .ok_or(BrowserError::NoPage)
    }

    /// 执行动作，返回写入历史的观察结果
    async fn perform(
        &self,
        page: &JsExecutor,
        action: &AgentAction,
        tools: &ToolRegistry,
        focus: &mut TabFocus<TargetId>,
    ) -> anyhow::Result<String> {
        let observation = match action {
            AgentAction::Click { index } => {
                match page.eval_as::<bool>(click_script(*index)).await {
                    Ok(true) => {
                        sleep(CLICK_SETTLE).await;
                        format!("clicked element {}", index)
                    }
                    Ok(false) => format!("element {} not found, take a fresh look", index),
                    Err(e) => format!("click on {} failed: {}", index, e),
                }
            }
            AgentAction::Navigate { url } => match page.goto(url).await {
                Ok(()) => format!("navigated to {}", url),
                Err(e) => format!("navigation to {} failed: {}", url, e),
            },
            AgentAction::SwitchTab { url } => match self.session.find_page(url).await? {
                Some(tab) => {
                    tab.bring_to_front().await?;
                    focus.focus(tab.target_id().clone());
                    format!(
                        "switched to {}",
                        tab.url().await?.unwrap_or_else(|| url.clone())
                    )
                }
                None => "no tabs are open".to_string(),
            },
            AgentAction::Scroll => match page.eval(SCROLL_SCRIPT).await {
                Ok(_) => "scrolled down".to_string(),
                Err(e) => format!("scroll failed: {}", e),
            },
            AgentAction::Wait { seconds } => {
                let seconds = (*seconds).clamp(1, MAX_WAIT_SECS);
                sleep(Duration::from_secs(seconds)).await;
                format!("waited {}s", seconds)
            }
            AgentAction::Tool { name, input } => {
                let output = tools.invoke(name, input.clone()).await;
                format!("tool {} returned {}", name, output)
            }
            AgentAction::Done { .. } => String::new(),
        };
        Ok(observation)
    }
}

#[async_trait]
impl NavigationAgent for LlmBrowserAgent {
    async fn run_task(
        &self,
        directive: &TaskDirective,
        tools: &ToolRegistry,
    ) -> anyhow::Result<AgentVerdict> {
        let task = directive.render();
        self.session.open(&directive.url).await?;

        let mut history: Vec<String> = Vec::new();
        let mut focus = TabFocus::default();
        for step in 1..=self.max_steps {
            // 点击可能打开新标签页，每一步都重新选择要观察的页面
            let page = self.observed_page(&mut focus).await?;
            let snapshot = self.snapshot(&page).await;
            let tabs = self.session.tab_urls().await?;

            let prompt = build_step_prompt(&task, &snapshot, &tabs, &history, tools);
            let response = self.llm.send_to_llm(&prompt, Some(SYSTEM_PROMPT)).await?;

            let action = match parse_action(&response) {
                Ok(action) => action,
                Err(e) => {
                    warn!("[步骤 {}] {}", step, e);
                    history.push(format!(
                        "step {}: reply was not a valid action, answer with one JSON object",
                        step
                    ));
                    continue;
                }
            };
            info!("[步骤 {}/{}] {:?}", step, self.max_steps, action);

            if let AgentAction::Done { success, summary } = &action {
                return Ok(AgentVerdict {
                    success: *success,
                    summary: summary.clone(),
                    steps: step,
                });
            }

            let observation = self.perform(&page, &action, tools, &mut focus).await?;
            debug!("[步骤 {}] {}", step, observation);
            history.push(format!("step {}: {}", step, truncate_text(&observation, 300)));
            if history.len() > HISTORY_LIMIT {
                history.remove(0);
            }
        }

        warn!("已达到最大步数 {}", self.max_steps);
        Ok(AgentVerdict {
            success: false,
            summary: format!("step budget of {} exhausted", self.max_steps),
            steps: self.max_steps,
        })
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

/// 创建真实浏览器 + LLM 代理
pub struct BrowserAgentFactory {
    config: Config,
}

impl BrowserAgentFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentFactory for BrowserAgentFactory {
    async fn create(&self, download_dir: &Path) -> anyhow::Result<AgentSession> {
        let session = Arc::new(BrowserSession::start(&self.config, download_dir).await?);

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ViewerRescueTool::new(
            session.clone(),
            session.download_dir().to_path_buf(),
            self.config.rescue_timeout(),
            self.config.rescue_grace(),
        )));

        let agent = LlmBrowserAgent::new(
            session,
            LlmService::new(&self.config),
            self.config.max_agent_steps,
        );
        info!("✓ 导航代理已就绪，模型: {}", self.config.llm_model_name);

        Ok(AgentSession {
            agent: Box::new(agent),
            tools,
        })
    }
}
