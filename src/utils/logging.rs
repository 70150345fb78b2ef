/// 日志工具模块
///
/// 提供日志初始化以及格式化输出的辅助函数
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；否则根据 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},chromiumoxide=warn")));

    // 测试中可能被重复调用，忽略重复初始化
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 文档提取服务启动");
    info!("🌐 监听地址: {}", config.bind_address());
    info!("🤖 导航模型: {}", config.llm_model_name);
    info!("📁 下载目录: {}", config.download_dir.display());
    info!(
        "⏱️ 单次提取超时: {}s, 最大并发: {}",
        config.run_timeout_secs, config.max_concurrent_extractions
    );
    info!("{}", "=".repeat(60));
}

/// 记录单次提取开始
pub fn log_extraction_start(job_id: &str, url: &str, bucket: &str, prefix: &str) {
    info!("\n{}", "=".repeat(60));
    info!("[任务 {}] 📥 开始提取: {}", job_id, url);
    info!("[任务 {}] 🪣 目标位置: s3://{}/{}", job_id, bucket, prefix);
    info!("{}", "=".repeat(60));
}

/// 记录已下载的文件列表
pub fn log_downloaded_files(files: &[(impl AsRef<Path>, u64)]) {
    info!("✓ 共下载 {} 个 PDF:", files.len());
    for (path, size) in files {
        let name = path
            .as_ref()
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        info!("  - {} ({} bytes)", name, size);
    }
}

/// 记录上传汇总
pub fn log_upload_summary(succeeded: usize, failed: &[(String, String)]) {
    info!("\n{}", "─".repeat(60));
    info!("📊 上传汇总: 成功 {}, 失败 {}", succeeded, failed.len());
    if !failed.is_empty() {
        tracing::warn!("失败的上传:");
        for (path, error) in failed {
            tracing::warn!("  - {}: {}", path, error);
        }
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
