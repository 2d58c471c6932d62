use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "queuecast", version, about = "语音会话播放管线的音频缓存工具")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 覆盖数据目录（默认走系统 data_local_dir）
    #[arg(long, global = true, env = "QUEUECAST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 覆盖日志目录（默认 `{data_dir}/logs`）
    #[arg(long, global = true, env = "QUEUECAST_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// 覆盖日志过滤（等价于设置 RUST_LOG）
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_filter: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 下载并校验一首曲目到缓存
    Prefetch {
        url: String,

        /// 期望时长（秒），用于校验下载是否完整；0 表示不校验
        #[arg(long, default_value_t = 0.0)]
        duration: f64,

        #[arg(long, default_value = "")]
        title: String,
    },

    /// 列出缓存条目
    Scan,

    /// 按预算执行一轮淘汰
    Evict,

    /// 清空缓存
    Clear,
}
