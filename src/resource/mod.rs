//! 可播放资源：决定走缓存文件还是直接流式播放，并负责重试

mod loader;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::fetch::AudioStream;

pub use loader::ResourceLoader;

/// 交给播放器的资源
#[derive(Debug)]
pub enum ResourceHandle {
    /// 已校验的本地缓存文件
    File { path: PathBuf },
    /// 直接流式播放；drop 时结束拉取进程
    Stream(AudioStream),
}

impl ResourceHandle {
    pub fn is_stream(&self) -> bool {
        matches!(self, ResourceHandle::Stream(_))
    }
}

/// 加载阶段进度
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    Attempt { attempt: u32, max: u32 },
    Processing,
    Success,
    Error(String),
}

impl fmt::Display for LoadProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadProgress::Attempt { attempt, max } => write!(f, "Attempt {attempt}/{max}"),
            LoadProgress::Processing => f.write_str("processing"),
            LoadProgress::Success => f.write_str("success"),
            LoadProgress::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(300),
            backoff_max: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间：指数增长，加少量抖动，不超过上限
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff.as_millis() as u64;
        let max_ms = self.backoff_max.as_millis() as u64;
        let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1).min(6)));

        let jitter = rand::thread_rng().gen_range(0..=100u64);
        Duration::from_millis(exp.saturating_add(jitter).min(max_ms))
    }
}
