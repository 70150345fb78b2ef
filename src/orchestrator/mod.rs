//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次提取请求的流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 提取流水线
//! - 为每个请求分配独立的下载目录
//! - 控制并发数量（Semaphore）
//! - 提前检查存储桶，运行编排器，批量上传
//! - 汇总为 success / partial / empty 结果
//! - 无论成败都清理本地目录
//!
//! ### `extraction` - 单次提取编排器
//! - 检查代理凭据
//! - 懒加载代理会话（浏览器 + 工具注册表）
//! - 限时运行代理，以下载目录中的文件为准
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (处理 ExtractionJob)
//!     ↓
//! extraction (处理单个 URL)
//!     ↓
//! agent (导航代理 + 查看器救援工具)
//!     ↓
//! services (能力层：downloads / uploader / llm)
//!     ↓
//! infrastructure (基础设施：JsExecutor / BrowserSession)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：pipeline 管请求，extraction 管浏览
//! 2. **资源隔离**：浏览器会话只属于一个编排器
//! 3. **向下依赖**：编排层 → agent → services → infrastructure
//! 4. **文件为准**：代理的结论只用于日志

pub mod extraction;
pub mod pipeline;

// 重新导出主要类型
pub use extraction::ExtractionOrchestrator;
pub use pipeline::{ExtractionJob, ExtractionOutcome, ExtractionPipeline, ExtractionStatus};
