use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::DownloadError;

/// 允许的绝对短缺上限（秒）
const MAX_SHORTFALL_SEC: f64 = 3.0;
/// 允许的相对短缺上限
const MAX_SHORTFALL_RATIO: f64 = 0.05;

/// 测量音频产物时长
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// 无法测量时返回 None
    async fn duration_sec(&self, path: &Path) -> Option<f64>;
}

pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn duration_sec(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                parse_ffprobe_duration(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                tracing::warn!(path = %path.display(), status = %out.status, "ffprobe 退出码异常");
                None
            }
            Err(e) => {
                tracing::warn!(program = %self.program, err = %e, "启动 ffprobe 失败");
                None
            }
        }
    }
}

fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    let v = stdout.trim().parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

/// 按期望时长校验产物是否完整
///
/// `shortfall = expected - actual`，允许 `min(3s, 5% * expected)` 以内的短缺；
/// 比期望更长的产物总是接受。期望时长未知（<= 0）时不做比较。
pub fn check_duration(expected_sec: f64, actual_sec: Option<f64>) -> Result<(), DownloadError> {
    if !expected_sec.is_finite() || expected_sec <= 0.0 {
        return Ok(());
    }
    let Some(actual) = actual_sec else {
        return Err(DownloadError::ValidationFailed {
            expected_sec,
            actual_sec: None,
        });
    };

    let shortfall = expected_sec - actual;
    let tolerance = MAX_SHORTFALL_SEC.min(expected_sec * MAX_SHORTFALL_RATIO);
    if shortfall <= tolerance {
        Ok(())
    } else {
        Err(DownloadError::ValidationFailed {
            expected_sec,
            actual_sec: Some(actual),
        })
    }
}
