//! JS 执行器 - 基础设施层
//!
//! 持有一个页面，只暴露"执行 JS / 导航"的能力

use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::BrowserError;

/// JS 执行器
///
/// 职责：
/// - 持有一个 Page（chromiumoxide 的 Page 内部是 Arc，clone 开销很小）
/// - 暴露 eval() / goto() 能力
/// - 不认识下载、代理指令等业务概念
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 页面对应的 CDP 目标
    pub fn target_id(&self) -> &TargetId {
        self.page.target_id()
    }

    /// 当前页面地址
    pub async fn url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.page.url().await?)
    }

    /// 导航到指定地址并等待加载完成
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await?;
        Ok(())
    }

    /// 把页面切换到前台
    pub async fn bring_to_front(&self) -> Result<(), BrowserError> {
        self.page.bring_to_front().await?;
        Ok(())
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JavaScript 代码
    ///
    /// # 返回
    /// 返回 JSON 值
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, BrowserError> {
        let result = self.page.evaluate(js_code.into()).await?;
        result
            .into_value()
            .map_err(|e| BrowserError::Command(e.to_string()))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, BrowserError> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| BrowserError::Command(e.to_string()))
    }
}
