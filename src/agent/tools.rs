//! 代理工具注册表
//!
//! 编排层把回调能力注册到这里，由导航代理在推理循环中按名字调用

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// 暴露给导航代理的工具
///
/// 输入输出都是 JSON，工具自身从不返回错误：失败也要编码在输出里，
/// 这样代理才能在下一步推理中看到原因
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    /// 给模型看的用途说明
    fn description(&self) -> &str;
    /// 输入参数的示例 JSON
    fn input_example(&self) -> JsonValue;
    async fn invoke(&self, input: JsonValue) -> JsonValue;
}

/// 工具注册表，按名字查找
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具，同名工具会被替换
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名字调用；未知工具返回一个带 error 字段的 JSON
    pub async fn invoke(&self, name: &str, input: JsonValue) -> JsonValue {
        match self.get(name) {
            Some(tool) => tool.invoke(input).await,
            None => serde_json::json!({
                "success": false,
                "error": format!("unknown tool '{}', available: {:?}", name, self.names()),
            }),
        }
    }

    /// 渲染成提示词中的工具说明
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|t| {
                format!(
                    "- {}: {}\n  input example: {}",
                    t.name(),
                    t.description(),
                    t.input_example()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
