//! 下载相关错误

/// 下载错误类型
///
/// 同一个 key 的所有等待者共享同一次下载的结果，所以这里只保存可克隆的信息。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DownloadError {
    /// 无法从 URL 解析出内容 key
    #[error("无法从 URL 解析内容 key: {url}")]
    KeyExtractionFailed { url: String },

    /// 拉取失败（网络/子进程）
    #[error("拉取音频失败: {0}")]
    FetchFailed(String),

    /// 时长校验失败，产物不完整
    #[error("音频不完整: 期望 {expected_sec:.1}s, 实际 {}", fmt_actual(.actual_sec))]
    ValidationFailed {
        expected_sec: f64,
        actual_sec: Option<f64>,
    },

    /// 写入缓存失败
    #[error("缓存操作失败: {0}")]
    Cache(String),
}

fn fmt_actual(actual: &Option<f64>) -> String {
    match actual {
        Some(v) => format!("{v:.1}s"),
        None => "未知".to_owned(),
    }
}

impl DownloadError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::KeyExtractionFailed { .. })
    }
}

impl From<super::FetchError> for DownloadError {
    fn from(e: super::FetchError) -> Self {
        DownloadError::FetchFailed(e.to_string())
    }
}

impl From<super::CacheError> for DownloadError {
    fn from(e: super::CacheError) -> Self {
        DownloadError::Cache(e.to_string())
    }
}
