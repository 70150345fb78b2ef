//! 下载目录对账 - 业务能力层
//!
//! 只负责"下载目录里现在有哪些 PDF"，不关心是谁下载的。
//! 代理自称成功与否不可信，目录状态才是唯一的事实来源。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::utils::logging::log_downloaded_files;

/// 列出目录下所有已下载的 PDF
///
/// - 只看目录第一层的普通文件
/// - 扩展名大小写不敏感
/// - 按文件名字节序排序（`B.pdf` 排在 `a.pdf` 之前）
/// - 目录不存在时返回空列表
pub fn list_downloaded(directory: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("无法读取下载目录 {}: {}", directory.display(), e);
            return Vec::new();
        }
    };

    let base = absolute(directory);
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| base.join(entry.file_name()))
        .filter(|path| is_pdf(path))
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// 列出 PDF 并记录每个文件的大小
pub fn collect_downloaded(directory: &Path) -> Vec<PathBuf> {
    let files = list_downloaded(directory);
    if files.is_empty() {
        warn!("⚠️ 下载目录中没有 PDF 文件: {}", directory.display());
        return files;
    }

    let sized: Vec<(&PathBuf, u64)> = files
        .iter()
        .map(|path| (path, fs::metadata(path).map(|m| m.len()).unwrap_or(0)))
        .collect();
    log_downloaded_files(&sized);
    files
}

/// 清空下载目录中的文件（不删除子目录）
///
/// 尽力而为：单个文件删除失败只记录日志，不影响调用方
pub fn clear(directory: &Path) {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("下载目录不存在，视为已清空: {}", directory.display());
            return;
        }
        Err(e) => {
            warn!("清空下载目录失败 {}: {}", directory.display(), e);
            return;
        }
    };

    let mut removed = 0usize;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                debug!("已清除: {}", path.display());
            }
            Err(e) => warn!("⚠️ 无法删除 {}: {}", path.display(), e),
        }
    }
    info!("🗑️ 下载目录已清空 ({} 个文件): {}", removed, directory.display());
}

/// 确保下载目录存在
pub fn ensure(directory: &Path) -> io::Result<()> {
    fs::create_dir_all(directory)
}

/// 删除整个（已清空的）目录，失败只记录日志
pub fn remove_dir(directory: &Path) {
    match fs::remove_dir_all(directory) {
        Ok(()) => debug!("已删除目录: {}", directory.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("⚠️ 无法删除目录 {}: {}", directory.display(), e),
    }
}

/// 扩展名是否为 pdf（大小写不敏感）
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn absolute(directory: &Path) -> PathBuf {
    fs::canonicalize(directory).unwrap_or_else(|_| directory.to_path_buf())
}
