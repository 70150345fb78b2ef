use std::sync::Arc;

use agentic_doc_extract::utils::logging;
use agentic_doc_extract::{api, BrowserAgentFactory, Config, ExtractionPipeline, S3Storage};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    // 创建存储后端和代理工厂
    let storage = Arc::new(S3Storage::new(&config));
    let factory = Arc::new(BrowserAgentFactory::new(config.clone()));
    let pipeline = Arc::new(ExtractionPipeline::new(config.clone(), factory, storage));

    // 运行 HTTP 服务
    api::serve(pipeline, &config.bind_address()).await
}
