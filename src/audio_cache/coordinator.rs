use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Semaphore;

use super::store::{CacheStore, EvictionReport};
use super::validate::{DurationProbe, check_duration};
use crate::domain::{ContentKey, Track};
use crate::error::{CacheError, DownloadError};
use crate::fetch::Fetcher;

type SharedDownload = Shared<BoxFuture<'static, Result<PathBuf, DownloadError>>>;

/// 同一内容 key 的并发请求只触发一次拉取
///
/// 进程级单例：启动时创建，所有会话共享。in-flight 表在注册时就持有一个已 spawn 的任务，
/// 任务结束（成功或失败）时移除表项，之后的请求从头开始。
#[derive(Clone)]
pub struct DownloadCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    probe: Arc<dyn DurationProbe>,
    in_flight: Mutex<HashMap<ContentKey, SharedDownload>>,
    permits: Semaphore,
    eviction: tokio::sync::Mutex<()>,
}

impl DownloadCoordinator {
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        probe: Arc<dyn DurationProbe>,
        concurrency: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                probe,
                in_flight: Mutex::new(HashMap::new()),
                permits: Semaphore::new(concurrency.max(1)),
                eviction: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// 当前下载中的 key 快照
    pub fn in_flight_keys(&self) -> HashSet<ContentKey> {
        self.inner.in_flight_keys()
    }

    pub fn is_in_flight(&self, key: &ContentKey) -> bool {
        self.inner.lock_in_flight().contains_key(key)
    }

    /// 返回 track 对应的已校验缓存文件，必要时下载
    pub async fn acquire(&self, track: &Track) -> Result<PathBuf, DownloadError> {
        let key = track
            .content_key()
            .ok_or_else(|| DownloadError::KeyExtractionFailed {
                url: track.url.clone(),
            })?;

        let store = &self.inner.store;
        if store.has(&key).await {
            if let Err(e) = store.touch(&key).await {
                tracing::warn!(key = %key, err = %e, "刷新缓存访问时间失败");
            }
            tracing::debug!(key = %key, "缓存命中");
            return Ok(store.path_for(&key));
        }

        self.join_or_start(key, track).await
    }

    /// 后台预取；错误只记录日志
    pub fn prefetch(&self, track: Track) {
        let this = self.clone();
        tokio::spawn(async move {
            match this.acquire(&track).await {
                Ok(path) => {
                    tracing::debug!(title = %track.title, path = %path.display(), "预取完成")
                }
                Err(e) => tracing::warn!(title = %track.title, err = %e, "预取失败"),
            }
        });
    }

    /// 执行一轮淘汰（与下载后自动触发的淘汰互斥）
    pub async fn evict(&self) -> Result<EvictionReport, CacheError> {
        self.inner.evict().await
    }

    /// 清空缓存（下载中的 key 保留）
    pub async fn clear(&self) -> Result<(usize, u64), CacheError> {
        let _pass = self.inner.eviction.lock().await;
        let in_flight = self.inner.in_flight_keys();
        self.inner.store.clear_all(&in_flight).await
    }

    fn join_or_start(&self, key: ContentKey, track: &Track) -> SharedDownload {
        let mut map = self.inner.lock_in_flight();
        if let Some(existing) = map.get(&key) {
            tracing::debug!(key = %key, "加入进行中的下载");
            return existing.clone();
        }

        // 在持锁期间 spawn 并注册：任务的清理同样需要这把锁，因此一定发生在注册之后
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_download(inner, key.clone(), track.clone()));
        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::FetchFailed(format!("下载任务异常结束: {e}"))),
            }
        }
        .boxed()
        .shared();

        map.insert(key, shared.clone());
        shared
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<ContentKey, SharedDownload>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight_keys(&self) -> HashSet<ContentKey> {
        self.lock_in_flight().keys().cloned().collect()
    }

    async fn evict(&self) -> Result<EvictionReport, CacheError> {
        let _pass = self.eviction.lock().await;
        let in_flight = self.in_flight_keys();
        self.store.evict_until_under_budget(&in_flight).await
    }
}

/// 任务结束时（包括 panic 展开）移除 in-flight 表项
struct InFlightGuard {
    inner: Arc<Inner>,
    key: ContentKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.key);
    }
}

async fn run_download(
    inner: Arc<Inner>,
    key: ContentKey,
    track: Track,
) -> Result<PathBuf, DownloadError> {
    let guard = InFlightGuard {
        inner: Arc::clone(&inner),
        key: key.clone(),
    };

    let _permit = inner
        .permits
        .acquire()
        .await
        .map_err(|_| DownloadError::Cache("下载队列已关闭".to_owned()))?;

    // 检查与注册之间，上一个同 key 下载可能刚刚提交
    if inner.store.has(&key).await {
        return Ok(inner.store.path_for(&key));
    }

    tracing::info!(key = %key, title = %track.title, "开始下载");
    let tmp = inner.store.temp_artifact(&key)?;
    let fetched = inner.fetcher.fetch_to_file(&track.url, &tmp).await;
    let leftovers = inner.store.discard_leftovers(&tmp).await;
    if leftovers > 0 {
        tracing::debug!(key = %key, leftovers, "已清理下载中间文件");
    }
    if let Err(e) = fetched {
        tracing::warn!(key = %key, err = %e, "下载失败");
        return Err(e.into());
    }

    let actual = inner.probe.duration_sec(&tmp).await;
    if let Err(e) = check_duration(track.duration_sec, actual) {
        tracing::warn!(key = %key, err = %e, "下载产物未通过校验，已丢弃");
        return Err(e);
    }

    let path = inner.store.commit(&key, tmp)?;
    if let Err(e) = inner.store.touch(&key).await {
        tracing::warn!(key = %key, err = %e, "刷新缓存访问时间失败");
    }
    tracing::info!(key = %key, path = %path.display(), "下载完成");

    drop(guard);
    let evictor = Arc::clone(&inner);
    tokio::spawn(async move {
        match evictor.evict().await {
            Ok(report) if report.removed_files > 0 || report.failed > 0 => tracing::info!(
                removed = report.removed_files,
                removed_bytes = report.removed_bytes,
                failed = report.failed,
                remaining_bytes = report.remaining_bytes,
                "缓存淘汰完成"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(err = %e, "缓存淘汰失败"),
        }
    });

    Ok(path)
}
