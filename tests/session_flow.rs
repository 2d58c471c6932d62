use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use queuecast::audio_cache::{CacheConfig, CacheStore, DownloadCoordinator, DurationProbe};
use queuecast::domain::Track;
use queuecast::error::{FetchError, QueueError, ResolveError, TransportError};
use queuecast::fetch::{AudioStream, Fetcher};
use queuecast::playback::{
    Player, PlayerEvent, PlayerStatus, QueueConfig, QueueNotice, SeedList, SessionRegistry,
    SupervisorConfig, TrackResolver, Transport, TransportLink, TransportProvider, TransportStatus,
};
use queuecast::resource::{ResourceHandle, ResourceLoader, RetryPolicy};

#[derive(Default)]
struct Recorder {
    rejoins: AtomicUsize,
    destroyed: AtomicBool,
    stops: AtomicUsize,
    file_fetches: AtomicUsize,
    /// (play_id, 是否流式)
    plays: Mutex<Vec<(u64, bool)>>,
    volumes: Mutex<Vec<f32>>,
}

impl Recorder {
    fn last_play_id(&self) -> u64 {
        self.plays.lock().unwrap().last().unwrap().0
    }
}

struct FakeFetcher(Arc<Recorder>);

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_to_file(&self, _url: &str, out: &Path) -> Result<(), FetchError> {
        self.0.file_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(out, b"encoded audio").await?;
        Ok(())
    }

    async fn open_stream(&self, _url: &str) -> Result<AudioStream, FetchError> {
        Ok(AudioStream::from_reader(std::io::Cursor::new(vec![0u8; 64])))
    }
}

struct FixedProbe;

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn duration_sec(&self, _path: &Path) -> Option<f64> {
        Some(200.0)
    }
}

struct FakeTransport(Arc<Recorder>);

#[async_trait]
impl Transport for FakeTransport {
    async fn rejoin(&self) -> Result<(), TransportError> {
        self.0.rejoins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        self.0.destroyed.store(true, Ordering::SeqCst);
    }
}

struct FakePlayer {
    rec: Arc<Recorder>,
    events: mpsc::Sender<PlayerEvent>,
}

#[async_trait]
impl Player for FakePlayer {
    async fn play(&self, play_id: u64, resource: ResourceHandle) {
        self.rec
            .plays
            .lock()
            .unwrap()
            .push((play_id, resource.is_stream()));
        let _ = self
            .events
            .send(PlayerEvent::StateChanged {
                play_id,
                status: PlayerStatus::Playing,
            })
            .await;
    }

    async fn stop(&self) {
        self.rec.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn set_volume(&self, level: f32) {
        self.rec.volumes.lock().unwrap().push(level);
    }
}

#[derive(Clone)]
struct Wires {
    transport: mpsc::Sender<TransportStatus>,
    player: mpsc::Sender<PlayerEvent>,
}

struct FakeProvider {
    rec: Arc<Recorder>,
    wires: Mutex<Option<Wires>>,
}

#[async_trait]
impl TransportProvider for FakeProvider {
    async fn connect(&self, _channel: &str) -> Result<TransportLink, TransportError> {
        let (transport_tx, transport_rx) = mpsc::channel(16);
        let (player_tx, player_rx) = mpsc::channel(16);
        *self.wires.lock().unwrap() = Some(Wires {
            transport: transport_tx,
            player: player_tx.clone(),
        });
        Ok(TransportLink {
            transport: Arc::new(FakeTransport(self.rec.clone())),
            player: Arc::new(FakePlayer {
                rec: self.rec.clone(),
                events: player_tx,
            }),
            transport_events: transport_rx,
            player_events: player_rx,
        })
    }
}

struct SeedResolver;

#[async_trait]
impl TrackResolver for SeedResolver {
    async fn resolve(&self, reference: &str) -> Result<Track, ResolveError> {
        if reference == "missing" {
            return Err(ResolveError::NotFound(reference.to_owned()));
        }
        Ok(long_track(reference))
    }
}

fn url_for(name: &str) -> String {
    format!("https://youtu.be/{name:x<11}")
}

/// 超过缓存阈值，走流式播放
fn long_track(name: &str) -> Track {
    Track::new(url_for(name), name, 3600.0)
}

struct Harness {
    registry: SessionRegistry,
    provider: Arc<FakeProvider>,
    rec: Arc<Recorder>,
    cache_dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let rec = Arc::new(Recorder::default());
        let cache_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(CacheConfig {
            dir: cache_dir.path().to_path_buf(),
            max_bytes: u64::MAX,
            ext: "opus".to_owned(),
        })
        .unwrap();
        let fetcher: Arc<dyn Fetcher> = Arc::new(FakeFetcher(rec.clone()));
        let downloads = DownloadCoordinator::new(store, fetcher.clone(), Arc::new(FixedProbe), 2);
        let loader = ResourceLoader::new(downloads, fetcher, RetryPolicy::default());
        let provider = Arc::new(FakeProvider {
            rec: rec.clone(),
            wires: Mutex::new(None),
        });
        let registry = SessionRegistry::new(
            provider.clone(),
            loader,
            Arc::new(SeedResolver),
            QueueConfig::default(),
            SupervisorConfig::default(),
        );
        Self {
            registry,
            provider,
            rec,
            cache_dir,
        }
    }

    fn wires(&self) -> Wires {
        self.provider.wires.lock().unwrap().clone().unwrap()
    }
}

/// 读取通知直到满足条件
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<QueueNotice>,
    pred: impl Fn(&QueueNotice) -> bool,
) -> QueueNotice {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let notice = rx.recv().await.expect("notice channel closed");
            if pred(&notice) {
                return notice;
            }
        }
    })
    .await
    .expect("timed out waiting for notice")
}

fn now_playing(title: &'static str) -> impl Fn(&QueueNotice) -> bool {
    move |n: &QueueNotice| matches!(n, QueueNotice::NowPlaying(t) if t.title == title)
}

async fn finish_current(h: &Harness) {
    let play_id = h.rec.last_play_id();
    h.wires()
        .player
        .send(PlayerEvent::StateChanged {
            play_id,
            status: PlayerStatus::Idle,
        })
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn queue_plays_in_order_and_leaves_after_idle_timeout() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    queue
        .enqueue(vec![long_track("first"), long_track("second")])
        .await
        .unwrap();
    wait_for(&mut rx, now_playing("first")).await;
    assert!(h.rec.plays.lock().unwrap()[0].1);

    finish_current(&h).await;
    wait_for(&mut rx, now_playing("second")).await;
    assert_eq!(h.rec.plays.lock().unwrap().len(), 2);

    queue.stop().await.unwrap();
    wait_for(&mut rx, |n| matches!(n, QueueNotice::QueueEnded)).await;
    assert!(h.registry.get("guild-1").is_some());
    assert!(!h.rec.destroyed.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(301)).await;
    wait_for(&mut rx, |n| matches!(n, QueueNotice::LeftChannel)).await;
    assert!(h.rec.destroyed.load(Ordering::SeqCst));
    assert!(h.registry.is_empty());

    for _ in 0..100 {
        if queue.is_closed() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(queue.enqueue(vec![long_track("late")]).await, Err(QueueError::Closed));
}

#[tokio::test(start_paused = true)]
async fn enqueue_after_stop_cancels_idle_teardown() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    queue.enqueue(vec![long_track("first")]).await.unwrap();
    wait_for(&mut rx, now_playing("first")).await;
    queue.stop().await.unwrap();
    wait_for(&mut rx, |n| matches!(n, QueueNotice::QueueEnded)).await;

    tokio::time::sleep(Duration::from_secs(200)).await;
    queue.enqueue(vec![long_track("again")]).await.unwrap();
    wait_for(&mut rx, now_playing("again")).await;

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(!h.rec.destroyed.load(Ordering::SeqCst));
    assert!(h.registry.get("guild-1").is_some());
}

#[tokio::test(start_paused = true)]
async fn short_tracks_play_from_cache() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    let short = Track::new(url_for("cached"), "cached", 200.0);
    queue.enqueue(vec![short.clone(), short]).await.unwrap();
    wait_for(&mut rx, now_playing("cached")).await;
    assert!(!h.rec.plays.lock().unwrap()[0].1);

    finish_current(&h).await;
    wait_for(&mut rx, now_playing("cached")).await;
    // 预取与加载共享同一次下载，第二次播放直接命中缓存
    assert_eq!(h.rec.file_fetches.load(Ordering::SeqCst), 1);
    assert!(h.cache_dir.path().join("cachedxxxxx.opus").exists());
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_five_attempts() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();
    let wires = h.wires();

    for n in 1..=5 {
        wires
            .transport
            .send(TransportStatus::Disconnected { kicked: false })
            .await
            .unwrap();
        for _ in 0..60 {
            if h.rec.rejoins.load(Ordering::SeqCst) == n {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), n);
    }

    wires
        .transport
        .send(TransportStatus::Disconnected { kicked: false })
        .await
        .unwrap();
    wait_for(&mut rx, |n| matches!(n, QueueNotice::LeftChannel)).await;
    assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), 5);
    assert!(h.rec.destroyed.load(Ordering::SeqCst));
    assert!(h.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn kick_stops_the_queue_without_rejoin() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    queue
        .enqueue(vec![long_track("first"), long_track("second")])
        .await
        .unwrap();
    wait_for(&mut rx, now_playing("first")).await;

    h.wires()
        .transport
        .send(TransportStatus::Disconnected { kicked: true })
        .await
        .unwrap();
    wait_for(&mut rx, |n| matches!(n, QueueNotice::QueueEnded)).await;

    let snap = queue.snapshot().await.unwrap();
    assert!(snap.stopped);
    assert!(snap.tracks.is_empty());
    assert_eq!(h.rec.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn kick_cancels_pending_rejoin() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();
    queue.enqueue(vec![long_track("first")]).await.unwrap();
    wait_for(&mut rx, now_playing("first")).await;
    let wires = h.wires();

    // 断线后 5s 才重连，期间被踢出
    wires
        .transport
        .send(TransportStatus::Disconnected { kicked: false })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    wires
        .transport
        .send(TransportStatus::Disconnected { kicked: true })
        .await
        .unwrap();
    wait_for(&mut rx, |n| matches!(n, QueueNotice::QueueEnded)).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), 0);

    // 被踢出之后的断线也不再重连
    wires
        .transport
        .send(TransportStatus::Disconnected { kicked: false })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), 0);
    assert!(h.registry.get("guild-1").is_some());

    tokio::time::sleep(Duration::from_secs(300)).await;
    wait_for(&mut rx, |n| matches!(n, QueueNotice::LeftChannel)).await;
    assert!(h.rec.destroyed.load(Ordering::SeqCst));
    assert_eq!(h.rec.rejoins.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn volume_follows_the_current_play() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    queue.set_volume(50).await.unwrap();
    queue
        .enqueue(vec![long_track("first"), long_track("second")])
        .await
        .unwrap();
    wait_for(&mut rx, now_playing("first")).await;
    assert_eq!(*h.rec.volumes.lock().unwrap(), vec![0.5]);

    queue.set_muted(true).await.unwrap();
    let snap = queue.snapshot().await.unwrap();
    assert_eq!((snap.volume, snap.muted), (50, true));
    assert_eq!(*h.rec.volumes.lock().unwrap(), vec![0.5, 0.0]);

    // 下一首沿用同一音量设置
    finish_current(&h).await;
    wait_for(&mut rx, now_playing("second")).await;
    assert_eq!(*h.rec.volumes.lock().unwrap(), vec![0.5, 0.0, 0.0]);
}

#[tokio::test(start_paused = true)]
async fn radio_refills_until_exhausted() {
    let h = Harness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let queue = h.registry.join("guild-1", "voice-1", tx).await.unwrap();

    queue
        .attach_radio(Box::new(SeedList::new(["seedone", "missing"])))
        .await
        .unwrap();
    let notice = wait_for(&mut rx, now_playing("seedone")).await;
    let QueueNotice::NowPlaying(track) = notice else {
        unreachable!()
    };
    assert_eq!(track.requested_by.as_deref(), Some("Radio"));

    finish_current(&h).await;
    wait_for(&mut rx, |n| {
        matches!(n, QueueNotice::TrackFailed { title, .. } if title == "missing")
    })
    .await;
    wait_for(&mut rx, |n| matches!(n, QueueNotice::RadioOver)).await;
    wait_for(&mut rx, |n| matches!(n, QueueNotice::QueueEnded)).await;
    assert!(queue.snapshot().await.unwrap().stopped);
}

#[tokio::test(start_paused = true)]
async fn duplicate_join_is_rejected() {
    let h = Harness::new();
    let (tx, _rx) = mpsc::unbounded_channel();
    let _queue = h.registry.join("guild-1", "voice-1", tx.clone()).await.unwrap();

    let err = h.registry.join("guild-1", "voice-2", tx).await.err().unwrap();
    assert_eq!(err, QueueError::AlreadyJoined("guild-1".to_owned()));
    assert_eq!(h.registry.session_ids(), vec!["guild-1".to_owned()]);
}
