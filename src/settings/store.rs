use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio_cache::CacheConfig;
use crate::fetch::YtDlpConfig;
use crate::playback::{QueueConfig, SupervisorConfig};
use crate::resource::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    // 缓存设置
    #[serde(default = "default_cache_max_mb")]
    pub cache_max_mb: u64,
    #[serde(default = "default_cache_ext")]
    pub cache_ext: String,
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "default_max_cache_duration_sec")]
    pub max_cache_duration_sec: f64,

    // 队列/加载设置
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,
    #[serde(default = "default_load_backoff_ms")]
    pub load_backoff_ms: u64,
    #[serde(default = "default_load_backoff_max_ms")]
    pub load_backoff_max_ms: u64,
    /// 新会话的默认音量（0-100）
    #[serde(default = "default_volume")]
    pub volume: u8,

    // 连接监督设置
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_step_secs")]
    pub reconnect_step_secs: u64,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    // 外部工具设置
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
    #[serde(default = "default_stream_format")]
    pub stream_format: String,
    #[serde(default = "default_stream_rate_limit")]
    pub stream_rate_limit: Option<String>,
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,
    #[serde(default = "default_fragment_retries")]
    pub fragment_retries: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            cache_max_mb: default_cache_max_mb(),
            cache_ext: default_cache_ext(),
            download_concurrency: default_download_concurrency(),
            max_cache_duration_sec: default_max_cache_duration_sec(),
            idle_timeout_secs: default_idle_timeout_secs(),
            load_attempts: default_load_attempts(),
            load_backoff_ms: default_load_backoff_ms(),
            load_backoff_max_ms: default_load_backoff_max_ms(),
            volume: default_volume(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_step_secs: default_reconnect_step_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ytdlp_path: default_ytdlp_path(),
            ffprobe_path: default_ffprobe_path(),
            ffmpeg_location: None,
            cookies_path: None,
            audio_quality: default_audio_quality(),
            stream_format: default_stream_format(),
            stream_rate_limit: default_stream_rate_limit(),
            concurrent_fragments: default_concurrent_fragments(),
            fragment_retries: default_fragment_retries(),
        }
    }
}

// 默认值函数（用于 serde default）
fn default_cache_max_mb() -> u64 { 2048 }
fn default_cache_ext() -> String { "opus".to_owned() }
fn default_download_concurrency() -> usize { 2 }
fn default_max_cache_duration_sec() -> f64 { 600.0 }
fn default_idle_timeout_secs() -> u64 { 300 }
fn default_load_attempts() -> u32 { 3 }
fn default_load_backoff_ms() -> u64 { 300 }
fn default_load_backoff_max_ms() -> u64 { 800 }
fn default_volume() -> u8 { 100 }
fn default_reconnect_max_attempts() -> u32 { 5 }
fn default_reconnect_step_secs() -> u64 { 5 }
fn default_ready_timeout_secs() -> u64 { 20 }
fn default_ytdlp_path() -> String { "yt-dlp".to_owned() }
fn default_ffprobe_path() -> String { "ffprobe".to_owned() }
fn default_audio_quality() -> String { "5".to_owned() }
fn default_stream_format() -> String { "bestaudio[acodec=opus]/bestaudio".to_owned() }
fn default_stream_rate_limit() -> Option<String> { Some("800K".to_owned()) }
fn default_concurrent_fragments() -> u32 { 4 }
fn default_fragment_retries() -> u32 { 10 }

impl PlaybackSettings {
    /// 用环境变量覆盖配置（环境变量优先于 settings.json）
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| env::var(name).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("QUEUECAST_CACHE_MAX_MB").and_then(|s| s.parse().ok()) {
            self.cache_max_mb = v;
        }
        if let Some(v) = lookup("QUEUECAST_IDLE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.idle_timeout_secs = v;
        }
        if let Some(v) = lookup("QUEUECAST_DOWNLOAD_CONCURRENCY")
            .and_then(|s| s.parse().ok())
            .filter(|v: &usize| *v > 0)
        {
            self.download_concurrency = v;
        }
        if let Some(v) = lookup("QUEUECAST_YTDLP").filter(|s| !s.trim().is_empty()) {
            self.ytdlp_path = v;
        }
        if let Some(v) = lookup("QUEUECAST_FFPROBE").filter(|s| !s.trim().is_empty()) {
            self.ffprobe_path = v;
        }
    }

    pub fn cache_config(&self, data_dir: &Path) -> CacheConfig {
        CacheConfig {
            dir: data_dir.join("audio_cache"),
            max_bytes: self.cache_max_mb.saturating_mul(1024).saturating_mul(1024),
            ext: self.cache_ext.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.load_attempts.max(1),
            backoff: Duration::from_millis(self.load_backoff_ms),
            backoff_max: Duration::from_millis(self.load_backoff_max_ms),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            max_rejoin_attempts: self.reconnect_max_attempts,
            rejoin_step: Duration::from_secs(self.reconnect_step_secs),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_cache_duration_sec: self.max_cache_duration_sec,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            default_volume: self.volume.min(100),
        }
    }

    pub fn ytdlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            program: self.ytdlp_path.clone(),
            ffmpeg_location: self.ffmpeg_location.clone(),
            cookies_path: self.cookies_path.clone(),
            audio_format: self.cache_ext.clone(),
            audio_quality: self.audio_quality.clone(),
            stream_format: self.stream_format.clone(),
            stream_rate_limit: self.stream_rate_limit.clone(),
            concurrent_fragments: self.concurrent_fragments,
            fragment_retries: self.fragment_retries,
        }
    }
}

pub fn load_settings(data_dir: &Path) -> PlaybackSettings {
    let p = settings_path(data_dir);
    let Ok(bytes) = fs::read(&p) else {
        return PlaybackSettings::default();
    };
    match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %p.display(), err = %e, "解析 settings.json 失败，使用默认配置");
            PlaybackSettings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, s: &PlaybackSettings) -> std::io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let p = settings_path(data_dir);
    let tmp = p.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(s).unwrap_or_else(|_| b"{}".to_vec());
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, &p) {
        let _ = fs::remove_file(&p);
        fs::rename(&tmp, &p).map_err(|_| e)?;
    }
    Ok(())
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            br#"{ "cache_max_mb": 100, "idle_timeout_secs": 30 }"#,
        )
        .unwrap();

        let s = load_settings(dir.path());
        assert_eq!(s.cache_max_mb, 100);
        assert_eq!(s.idle_timeout_secs, 30);
        assert_eq!(s.load_attempts, 3);
        assert_eq!(s.reconnect_max_attempts, 5);
        assert_eq!(s.stream_rate_limit.as_deref(), Some("800K"));
        assert_eq!(s.volume, 100);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), b"{ not json").unwrap();
        let s = load_settings(dir.path());
        assert_eq!(s.cache_max_mb, 2048);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let s = PlaybackSettings {
            download_concurrency: 4,
            cookies_path: Some(PathBuf::from("/etc/cookies.txt")),
            ..PlaybackSettings::default()
        };
        save_settings(dir.path(), &s).unwrap();

        let back = load_settings(dir.path());
        assert_eq!(back.download_concurrency, 4);
        assert_eq!(back.cookies_path, Some(PathBuf::from("/etc/cookies.txt")));
        assert!(!dir.path().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_overrides() {
        let mut s = PlaybackSettings::default();
        s.apply_overrides_from(|name| match name {
            "QUEUECAST_CACHE_MAX_MB" => Some("512".to_owned()),
            "QUEUECAST_DOWNLOAD_CONCURRENCY" => Some("0".to_owned()),
            "QUEUECAST_YTDLP" => Some("/opt/bin/yt-dlp".to_owned()),
            _ => None,
        });
        assert_eq!(s.cache_max_mb, 512);
        // 0 并发无意义，保持默认
        assert_eq!(s.download_concurrency, 2);
        assert_eq!(s.ytdlp_path, "/opt/bin/yt-dlp");
    }

    #[test]
    fn test_derived_configs() {
        let s = PlaybackSettings {
            cache_max_mb: 100,
            ..PlaybackSettings::default()
        };
        let cache = s.cache_config(Path::new("/data"));
        assert_eq!(cache.max_bytes, 100 * 1024 * 1024);
        assert_eq!(cache.dir, PathBuf::from("/data/audio_cache"));

        let retry = s.retry_policy();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Duration::from_millis(300));
        assert_eq!(retry.backoff_max, Duration::from_millis(800));

        let queue = PlaybackSettings {
            volume: 180,
            ..PlaybackSettings::default()
        }
        .queue_config();
        assert_eq!(queue.default_volume, 100);
        assert_eq!(queue.idle_timeout, Duration::from_secs(300));
    }
}
