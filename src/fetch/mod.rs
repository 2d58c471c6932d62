//! 拉取器边界：把来源 URL 变成本地文件或字节流
//!
//! 子进程的启动/管道/结束都封装在这里，核心逻辑只依赖 [`Fetcher`] trait，
//! 测试可以替换成返回固定数据的假实现。

mod stream;
mod ytdlp;

use async_trait::async_trait;
use std::path::Path;

use crate::error::FetchError;

pub use stream::AudioStream;
pub use ytdlp::{YtDlpConfig, YtDlpFetcher};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 下载完整的编码音频到 `out`；调用方负责临时路径的提交与清理
    async fn fetch_to_file(&self, url: &str, out: &Path) -> Result<(), FetchError>;

    /// 打开直接播放用的字节流；流被关闭或出错时底层拉取进程会被结束
    async fn open_stream(&self, url: &str) -> Result<AudioStream, FetchError>;
}
