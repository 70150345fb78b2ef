//! 导航代理任务指令
//!
//! 指令把"触发下载"和"确认落盘"拆成三个阶段：
//! 代理经常在文档真正写入磁盘之前就关掉标签页，分阶段可以避免静默丢失文档。

use std::path::{Path, PathBuf};

use super::rescue::RESCUE_TOOL_NAME;

/// 需要识别为"文档获取入口"的界面元素
pub const RETRIEVAL_AFFORDANCES: &[&str] = &[
    "Direct links ending in .pdf",
    "\"Download\" buttons or links",
    "\"View Document\" buttons",
    "\"View Event Package\" buttons",
    "\"Event Package\" or \"Solicitation Package\" sections",
    "\"Attachments\" lists",
    "\"Documents\" tabs or sections",
];

/// 目标站点登录凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLogin {
    pub username: String,
    pub password: String,
}

/// 一次提取的任务指令
#[derive(Debug, Clone)]
pub struct TaskDirective {
    pub url: String,
    pub download_dir: PathBuf,
    pub affordances: Vec<String>,
    pub login: Option<SiteLogin>,
}

impl TaskDirective {
    pub fn new(url: impl Into<String>, download_dir: &Path) -> Self {
        Self {
            url: url.into(),
            download_dir: download_dir.to_path_buf(),
            affordances: RETRIEVAL_AFFORDANCES.iter().map(|s| s.to_string()).collect(),
            login: None,
        }
    }

    pub fn with_login(mut self, login: Option<SiteLogin>) -> Self {
        self.login = login;
        self
    }

    /// 渲染成给代理的自然语言任务
    pub fn render(&self) -> String {
        let affordances = self
            .affordances
            .iter()
            .map(|a| format!("   - {}", a))
            .collect::<Vec<_>>()
            .join("\n");

        let login = match &self.login {
            Some(login) => format!(
                "\nIf the site asks you to sign in, use username \"{}\" and password \"{}\".\n",
                login.username, login.password
            ),
            None => String::new(),
        };

        format!(
            r#"Navigate to this procurement/solicitation page: {url}

Your task is to download ALL PDF documents available on this page into the folder:
{dir}
{login}
Treat any of these as a document-retrieval affordance:
{affordances}

Work in three phases:

PHASE 1 - DISCOVER AND TRIGGER
   Wait for the page to fully load, then find every retrieval affordance and click it.
   Keep a count of how many affordances you discovered.
   If a click opens the PDF inside a browser viewer tab instead of starting a download,
   do NOT close that tab. Note its URL and defer it to phase 2.

PHASE 2 - RESCUE DEFERRED VIEWERS
   For every deferred viewer tab, call the tool "{tool}" with {{"url_hint": "<viewer tab URL>"}}.
   Repeat the call for that tab until it reports success.

PHASE 3 - VERIFY
   Confirm that the number of saved documents equals the number of affordances you discovered.
   If any are missing, go back to phase 1 or 2 for them.
   Only then finish and report completion.

IMPORTANT: Download ALL PDF files you find. Do not skip any documents."#,
            url = self.url,
            dir = self.download_dir.display(),
            login = login,
            affordances = affordances,
            tool = RESCUE_TOOL_NAME,
        )
    }
}
