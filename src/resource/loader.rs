use std::sync::Arc;

use super::{LoadProgress, ResourceHandle, RetryPolicy};
use crate::audio_cache::DownloadCoordinator;
use crate::domain::Track;
use crate::error::LoadError;
use crate::fetch::Fetcher;

/// 把曲目变成可以交给播放器的资源
#[derive(Clone)]
pub struct ResourceLoader {
    downloads: DownloadCoordinator,
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
}

impl ResourceLoader {
    pub fn new(
        downloads: DownloadCoordinator,
        fetcher: Arc<dyn Fetcher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            downloads,
            fetcher,
            retry,
        }
    }

    pub fn downloads(&self) -> &DownloadCoordinator {
        &self.downloads
    }

    /// 单次加载
    ///
    /// `should_cache == false` 时直接打开字节流，不落盘也不校验。
    pub async fn load(
        &self,
        track: &Track,
        should_cache: bool,
        progress: &(dyn Fn(LoadProgress) + Send + Sync),
    ) -> Result<ResourceHandle, LoadError> {
        progress(LoadProgress::Processing);
        let result = self.load_once(track, should_cache).await;
        match &result {
            Ok(_) => progress(LoadProgress::Success),
            Err(e) => progress(LoadProgress::Error(e.to_string())),
        }
        result
    }

    async fn load_once(
        &self,
        track: &Track,
        should_cache: bool,
    ) -> Result<ResourceHandle, LoadError> {
        if !should_cache {
            tracing::debug!(title = %track.title, "流式播放");
            let stream = self.fetcher.open_stream(&track.url).await?;
            return Ok(ResourceHandle::Stream(stream));
        }

        let store = self.downloads.store();
        if let Some(key) = track.content_key()
            && store.has(&key).await
        {
            if let Err(e) = store.touch(&key).await {
                tracing::warn!(key = %key, err = %e, "刷新缓存访问时间失败");
            }
            return Ok(ResourceHandle::File {
                path: store.path_for(&key),
            });
        }

        let path = self.downloads.acquire(track).await?;
        Ok(ResourceHandle::File { path })
    }

    /// 带重试的加载：最多 `max_attempts` 次，不可重试的错误立即返回
    pub async fn load_with_retry(
        &self,
        track: &Track,
        should_cache: bool,
        progress: &(dyn Fn(LoadProgress) + Send + Sync),
    ) -> Result<ResourceHandle, LoadError> {
        let max = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            progress(LoadProgress::Attempt { attempt, max });
            match self.load(track, should_cache, progress).await {
                Ok(resource) => return Ok(resource),
                Err(e) if attempt >= max || !e.is_retryable() => {
                    tracing::warn!(title = %track.title, attempt, err = %e, "加载失败");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::debug!(
                        title = %track.title,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        err = %e,
                        "加载失败，稍后重试"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
