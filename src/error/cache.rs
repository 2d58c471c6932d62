//! 音频缓存相关错误

use std::path::PathBuf;

/// 缓存操作错误类型
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 缓存目录不可用
    #[error("缓存目录不可用({path}): {source}")]
    DirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 扫描缓存目录失败
    #[error("扫描缓存目录失败: {source}")]
    Scan {
        #[source]
        source: std::io::Error,
    },

    /// 提交临时文件失败
    #[error("提交临时文件失败({key}): {source}")]
    Commit {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// 文件操作失败
    #[error("文件操作失败: {0}")]
    FileOp(#[from] std::io::Error),
}
