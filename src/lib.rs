//! # Agentic Doc Extract
//!
//! 从采购 / 招标网页自动提取全部 PDF 并上传到对象存储的服务
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - `JsExecutor`，页面能力的唯一出口
//! - `browser/` - 启动 / 连接浏览器，`BrowserSession` 持有 Browser 并接管下载
//!
//! ### ② 业务能力层（Services）
//! - `services/downloads` - 下载目录对账（列出 / 清空）
//! - `services/uploader` - 批量上传，逐文件隔离失败
//! - `services/storage` - 对象存储后端（S3 / 内存）
//! - `services/llm_service` - LLM 调用能力
//!
//! ### ③ 代理层（Agent）
//! - `agent/` - 导航代理、任务指令、工具注册表、查看器救援工具
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/extraction` - 单次提取：清空目录 → 运行代理 → 对账
//! - `orchestrator/pipeline` - 一次请求：检查存储桶 → 提取 → 上传 → 汇总
//!
//! ### ⑤ 接口层（API）
//! - `api/` - `GET /health`、`GET /`、`POST /extract`
//!
//! ## 模块结构

pub mod agent;
pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use agent::{AgentFactory, BrowserAgentFactory, NavigationAgent, TaskDirective};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use orchestrator::{
    ExtractionJob, ExtractionOrchestrator, ExtractionOutcome, ExtractionPipeline,
    ExtractionStatus,
};
pub use services::{MemoryStorage, ObjectStorage, S3Storage, StorageUploader};
