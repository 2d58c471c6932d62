mod cli;

use std::cmp::Reverse;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use directories::ProjectDirs;

use cli::{Cli, Command};
use queuecast::audio_cache::{CacheStore, DownloadCoordinator, FfprobeProbe};
use queuecast::domain::Track;
use queuecast::error::AppError;
use queuecast::fetch::YtDlpFetcher;
use queuecast::{logging, settings};

const MB: f64 = 1024.0 * 1024.0;

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "queuecast", "queuecast")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("queuecast"))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    let _log_guard = logging::init(
        &data_dir,
        logging::LogConfig {
            dir: cli.log_dir.clone(),
            filter: cli.log_filter.clone(),
            stderr: true,
        },
    );
    tracing::info!(data_dir = %data_dir.display(), "queuecast 启动");

    let mut cfg = settings::load_settings(&data_dir);
    cfg.apply_env_overrides();

    let store = CacheStore::open(cfg.cache_config(&data_dir))?;
    let downloads = DownloadCoordinator::new(
        store,
        Arc::new(YtDlpFetcher::new(cfg.ytdlp_config())),
        Arc::new(FfprobeProbe::new(cfg.ffprobe_path.clone())),
        cfg.download_concurrency,
    );

    match cli.command {
        Command::Prefetch {
            url,
            duration,
            title,
        } => {
            tracing::info!(url = %url, duration, "启动模式: Prefetch");
            let title = if title.is_empty() { url.clone() } else { title };
            let track = Track::new(url, title, duration);
            let path = downloads.acquire(&track).await?;
            println!("{}", path.display());
            downloads.evict().await?;
        }
        Command::Scan => {
            let mut entries = downloads.store().scan().await?;
            entries.sort_by_key(|e| Reverse(e.last_access));
            let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
            for e in &entries {
                println!("{}\t{:.1} MB\t{}", e.key, e.size_bytes as f64 / MB, e.path.display());
            }
            println!(
                "共 {} 个文件, {:.1} MB / {:.1} MB",
                entries.len(),
                total as f64 / MB,
                downloads.store().max_bytes() as f64 / MB
            );
        }
        Command::Evict => {
            let report = downloads.evict().await?;
            println!(
                "淘汰 {} 个文件 ({:.1} MB), 失败 {}, 剩余 {:.1} MB",
                report.removed_files,
                report.removed_bytes as f64 / MB,
                report.failed,
                report.remaining_bytes as f64 / MB
            );
        }
        Command::Clear => {
            let (files, bytes) = downloads.clear().await?;
            println!("已清除 {files} 个文件 ({:.1} MB)", bytes as f64 / MB);
        }
    }
    Ok(())
}
