//! 导航代理
//!
//! 编排层只依赖这里的两个 trait：
//! - [`AgentFactory`] 负责创建浏览器会话和代理（开销大，每个编排器只创建一次）
//! - [`NavigationAgent`] 负责执行一条自然语言任务
//!
//! 代理报告的成功与否只是参考，真正的结果以下载目录中的文件为准。

pub mod browser_agent;
pub mod directive;
pub mod rescue;
pub mod tools;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

pub use browser_agent::{BrowserAgentFactory, LlmBrowserAgent};
pub use directive::{SiteLogin, TaskDirective};
pub use rescue::{RescueResult, ViewerRescueTool, RESCUE_TOOL_NAME};
pub use tools::{AgentTool, ToolRegistry};

/// 代理自己给出的结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentVerdict {
    pub success: bool,
    pub summary: String,
    pub steps: usize,
}

impl fmt::Display for AgentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success={} steps={} summary={}",
            self.success, self.steps, self.summary
        )
    }
}

#[async_trait]
pub trait NavigationAgent: Send + Sync {
    /// 执行一次任务，工具注册表中的工具可在推理循环中调用
    async fn run_task(
        &self,
        directive: &TaskDirective,
        tools: &ToolRegistry,
    ) -> anyhow::Result<AgentVerdict>;

    /// 释放浏览器等资源；可重复调用
    async fn close(&self);
}

/// 工厂创建出的代理及其工具
pub struct AgentSession {
    pub agent: Box<dyn NavigationAgent>,
    pub tools: ToolRegistry,
}

#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// 创建一个把下载写入 `download_dir` 的代理会话
    async fn create(&self, download_dir: &Path) -> anyhow::Result<AgentSession>;
}
