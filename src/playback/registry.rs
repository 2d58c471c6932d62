use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::queue::{PlaybackQueue, QueueContext, spawn_queue};
use super::state::{QueueConfig, QueueNotice};
use super::supervisor::SupervisorConfig;
use super::transport::{TrackResolver, TransportProvider};
use crate::error::QueueError;
use crate::resource::ResourceLoader;

/// 会话 id -> 播放队列
///
/// 进程级：启动时创建；加入会话时插入，会话结束（空闲超时或传输终止）时由会话自己移除。
/// 遍历前先取快照，不在锁内做任何异步操作。
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, PlaybackQueue>>,
    next_instance: AtomicU64,
    provider: Arc<dyn TransportProvider>,
    loader: ResourceLoader,
    resolver: Arc<dyn TrackResolver>,
    queue_config: QueueConfig,
    supervisor_config: SupervisorConfig,
}

impl SessionRegistry {
    pub fn new(
        provider: Arc<dyn TransportProvider>,
        loader: ResourceLoader,
        resolver: Arc<dyn TrackResolver>,
        queue_config: QueueConfig,
        supervisor_config: SupervisorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                next_instance: AtomicU64::new(1),
                provider,
                loader,
                resolver,
                queue_config,
                supervisor_config,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PlaybackQueue>> {
        self.inner.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 连接频道并创建会话
    pub async fn join(
        &self,
        session_id: &str,
        channel: &str,
        notices: mpsc::UnboundedSender<QueueNotice>,
    ) -> Result<PlaybackQueue, QueueError> {
        if self.get(session_id).is_some() {
            return Err(QueueError::AlreadyJoined(session_id.to_owned()));
        }

        let link = self.inner.provider.connect(channel).await?;

        // 检查与插入在同一次加锁内完成
        let joined = {
            let mut sessions = self.lock();
            if sessions.get(session_id).is_some_and(|q| !q.is_closed()) {
                Err(link)
            } else {
                let instance = self.inner.next_instance.fetch_add(1, Ordering::Relaxed);
                let ctx = QueueContext {
                    loader: self.inner.loader.clone(),
                    resolver: self.inner.resolver.clone(),
                    queue_config: self.inner.queue_config,
                    supervisor_config: self.inner.supervisor_config,
                    registry: self.clone(),
                    notices,
                };
                let queue = spawn_queue(session_id, instance, link, ctx);
                sessions.insert(session_id.to_owned(), queue.clone());
                Ok(queue)
            }
        };

        match joined {
            Ok(queue) => {
                tracing::info!(session = session_id, channel, "已加入会话");
                Ok(queue)
            }
            Err(link) => {
                tracing::warn!(session = session_id, "并发加入同一会话，放弃新连接");
                link.transport.destroy().await;
                Err(QueueError::AlreadyJoined(session_id.to_owned()))
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<PlaybackQueue> {
        self.lock()
            .get(session_id)
            .filter(|q| !q.is_closed())
            .cloned()
    }

    /// 只移除同一个实例，避免误删同 id 的新会话
    pub(crate) fn remove(&self, session_id: &str, instance: u64) {
        let mut sessions = self.lock();
        if sessions
            .get(session_id)
            .is_some_and(|q| q.instance() == instance)
        {
            sessions.remove(session_id);
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
