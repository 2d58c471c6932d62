use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::{AudioStream, Fetcher};
use crate::error::FetchError;

/// yt-dlp 调用配置
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub program: String,
    pub ffmpeg_location: Option<PathBuf>,
    pub cookies_path: Option<PathBuf>,
    /// 缓存下载时提取的音频格式（同时也是缓存文件扩展名）
    pub audio_format: String,
    pub audio_quality: String,
    /// 流式播放时的格式选择（优先已经是 opus 的流）
    pub stream_format: String,
    pub stream_rate_limit: Option<String>,
    pub concurrent_fragments: u32,
    pub fragment_retries: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_owned(),
            ffmpeg_location: None,
            cookies_path: None,
            audio_format: "opus".to_owned(),
            audio_quality: "5".to_owned(),
            stream_format: "bestaudio[acodec=opus]/bestaudio".to_owned(),
            stream_rate_limit: Some("800K".to_owned()),
            concurrent_fragments: 4,
            fragment_retries: 10,
        }
    }
}

pub struct YtDlpFetcher {
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    fn common_args(&self, args: &mut Vec<String>) {
        args.extend([
            "--no-playlist".to_owned(),
            "--concurrent-fragments".to_owned(),
            self.config.concurrent_fragments.to_string(),
            "--fragment-retries".to_owned(),
            self.config.fragment_retries.to_string(),
            "--quiet".to_owned(),
            "--no-progress".to_owned(),
        ]);
        if let Some(p) = &self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_owned());
            args.push(p.display().to_string());
        }
        if let Some(p) = &self.config.cookies_path {
            args.push("--cookies".to_owned());
            args.push(p.display().to_string());
        }
    }

    fn download_args(&self, url: &str, output_template: &str) -> Vec<String> {
        let mut args = vec![
            "-x".to_owned(),
            "--audio-format".to_owned(),
            self.config.audio_format.clone(),
            "--audio-quality".to_owned(),
            self.config.audio_quality.clone(),
            "--force-overwrites".to_owned(),
            "--output".to_owned(),
            output_template.to_owned(),
        ];
        self.common_args(&mut args);
        args.push("--".to_owned());
        args.push(url.to_owned());
        args
    }

    fn stream_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--format".to_owned(),
            self.config.stream_format.clone(),
            "--output".to_owned(),
            "-".to_owned(),
        ];
        if let Some(rate) = &self.config.stream_rate_limit {
            args.push("--limit-rate".to_owned());
            args.push(rate.clone());
        }
        self.common_args(&mut args);
        args.push("--".to_owned());
        args.push(url.to_owned());
        args
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch_to_file(&self, url: &str, out: &Path) -> Result<(), FetchError> {
        // yt-dlp 按模板决定最终扩展名，先写到 `<out>.<fmt>` 再改名为 `out`
        let template = format!("{}.%(ext)s", out.display());
        let produced = PathBuf::from(format!("{}.{}", out.display(), self.config.audio_format));
        let program = &self.config.program;

        let output = Command::new(program)
            .args(self.download_args(url, &template))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                url,
                status = %output.status,
                stderr = %stderr.trim(),
                "yt-dlp 下载失败"
            );
            remove_leftover(&produced).await;
            return Err(FetchError::Exit {
                program: program.clone(),
                status: output.status,
            });
        }

        if let Err(e) = tokio::fs::rename(&produced, out).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(FetchError::MissingOutput(produced.display().to_string()));
            }
            remove_leftover(&produced).await;
            return Err(FetchError::Io(e));
        }
        Ok(())
    }

    async fn open_stream(&self, url: &str) -> Result<AudioStream, FetchError> {
        let program = &self.config.program;
        let child = Command::new(program)
            .args(self.stream_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: program.clone(),
                source,
            })?;
        tracing::debug!(url, pid = ?child.id(), "yt-dlp 流式拉取已启动");
        AudioStream::from_child(child, program)
    }
}

async fn remove_leftover(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), err = %e, "删除 yt-dlp 输出失败"),
    }
}
