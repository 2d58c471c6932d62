//! 资源加载相关错误

use super::{DownloadError, FetchError};

/// 加载可播放资源的错误类型
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// 缓存下载失败
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// 打开流式资源失败
    #[error("打开音频流失败: {0}")]
    Stream(#[from] FetchError),
}

impl LoadError {
    /// 判断是否是可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Download(e) => e.is_retryable(),
            LoadError::Stream(_) => true,
        }
    }
}
