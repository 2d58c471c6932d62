use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::radio::RadioSession;
use super::registry::SessionRegistry;
use super::state::{
    QueueConfig, QueueEffect, QueueEffects, QueueEvent, QueueNotice, QueueSnapshot, QueueState,
};
use super::supervisor::{SupervisorConfig, SupervisorEffect, SupervisorState};
use super::transport::{
    Player, PlayerEvent, TrackResolver, Transport, TransportLink, TransportStatus,
};
use crate::domain::Track;
use crate::error::QueueError;
use crate::resource::{LoadProgress, ResourceLoader};

const RADIO_REQUESTER: &str = "Radio";

enum QueueCommand {
    Enqueue(Vec<Track>),
    Stop,
    Shuffle,
    SetLoop(bool),
    Skip,
    SetVolume(u8),
    SetMuted(bool),
    AttachRadio(Box<dyn RadioSession>),
    Snapshot(oneshot::Sender<QueueSnapshot>),
}

/// 会话播放队列的句柄
///
/// 状态全部在 actor 任务内；句柄只发送命令，actor 结束后所有操作返回 [`QueueError::Closed`]。
#[derive(Clone)]
pub struct PlaybackQueue {
    session_id: Arc<str>,
    instance: u64,
    tx: mpsc::Sender<QueueCommand>,
}

impl PlaybackQueue {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<(), QueueError> {
        self.send(QueueCommand::Enqueue(tracks)).await
    }

    pub async fn stop(&self) -> Result<(), QueueError> {
        self.send(QueueCommand::Stop).await
    }

    pub async fn shuffle(&self) -> Result<(), QueueError> {
        self.send(QueueCommand::Shuffle).await
    }

    pub async fn set_loop(&self, on: bool) -> Result<(), QueueError> {
        self.send(QueueCommand::SetLoop(on)).await
    }

    pub async fn skip(&self) -> Result<(), QueueError> {
        self.send(QueueCommand::Skip).await
    }

    /// 音量 0-100，超出部分按 100 处理
    pub async fn set_volume(&self, volume: u8) -> Result<(), QueueError> {
        self.send(QueueCommand::SetVolume(volume)).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), QueueError> {
        self.send(QueueCommand::SetMuted(muted)).await
    }

    pub async fn attach_radio(&self, radio: Box<dyn RadioSession>) -> Result<(), QueueError> {
        self.send(QueueCommand::AttachRadio(radio)).await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.send(QueueCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| QueueError::Closed)
    }

    async fn send(&self, cmd: QueueCommand) -> Result<(), QueueError> {
        self.tx.send(cmd).await.map_err(|_| QueueError::Closed)
    }
}

pub(crate) struct QueueContext {
    pub loader: ResourceLoader,
    pub resolver: Arc<dyn TrackResolver>,
    pub queue_config: QueueConfig,
    pub supervisor_config: SupervisorConfig,
    pub registry: SessionRegistry,
    pub notices: mpsc::UnboundedSender<QueueNotice>,
}

pub(crate) fn spawn_queue(
    session_id: &str,
    instance: u64,
    link: TransportLink,
    ctx: QueueContext,
) -> PlaybackQueue {
    let (tx, rx) = mpsc::channel(64);
    let (tx_internal, rx_internal) = mpsc::channel(64);
    let session_id: Arc<str> = Arc::from(session_id);

    let actor = QueueActor {
        session_id: session_id.clone(),
        instance,
        state: QueueState::new(ctx.queue_config),
        supervisor: SupervisorState::new(ctx.supervisor_config),
        idle_timeout: ctx.queue_config.idle_timeout,
        transport: link.transport,
        player: link.player,
        loader: ctx.loader,
        resolver: ctx.resolver,
        radio: None,
        registry: ctx.registry,
        notices: ctx.notices,
        tx_internal,
        idle_deadline: None,
        rejoin_at: None,
        ready_deadline: None,
        transport_destroyed: false,
    };
    tokio::spawn(actor.run(rx, rx_internal, link.transport_events, link.player_events));

    PlaybackQueue {
        session_id,
        instance,
        tx,
    }
}

enum Step {
    Command(QueueCommand),
    Queue(QueueEvent),
    Player(PlayerEvent),
    Transport(TransportStatus),
    Rejoin(u32),
    ReadyTimeout,
    HandlesGone,
}

enum Flow {
    Continue,
    Exit,
}

struct QueueActor {
    session_id: Arc<str>,
    instance: u64,
    state: QueueState,
    supervisor: SupervisorState,
    idle_timeout: Duration,
    transport: Arc<dyn Transport>,
    player: Arc<dyn Player>,
    loader: ResourceLoader,
    resolver: Arc<dyn TrackResolver>,
    radio: Option<Box<dyn RadioSession>>,
    registry: SessionRegistry,
    notices: mpsc::UnboundedSender<QueueNotice>,
    tx_internal: mpsc::Sender<QueueEvent>,
    idle_deadline: Option<Instant>,
    rejoin_at: Option<(Instant, u32)>,
    ready_deadline: Option<Instant>,
    transport_destroyed: bool,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

impl QueueActor {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<QueueCommand>,
        mut rx_internal: mpsc::Receiver<QueueEvent>,
        mut transport_events: mpsc::Receiver<TransportStatus>,
        mut player_events: mpsc::Receiver<PlayerEvent>,
    ) {
        tracing::info!(session = %self.session_id, "播放会话已启动");
        let mut fx = QueueEffects::default();
        self.state.start(&mut fx);
        let mut flow = self.run_queue_effects(fx).await;

        while matches!(flow, Flow::Continue) {
            let rejoin_at = self.rejoin_at;
            let step = tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => Step::Command(cmd),
                    None => Step::HandlesGone,
                },
                Some(evt) = rx_internal.recv() => Step::Queue(evt),
                Some(evt) = player_events.recv() => Step::Player(evt),
                Some(status) = transport_events.recv() => Step::Transport(status),
                _ = sleep_until_opt(self.idle_deadline) => Step::Queue(QueueEvent::IdleTimeout),
                _ = sleep_until_opt(rejoin_at.map(|(at, _)| at)) => {
                    Step::Rejoin(rejoin_at.map(|(_, n)| n).unwrap_or_default())
                }
                _ = sleep_until_opt(self.ready_deadline) => Step::ReadyTimeout,
            };

            flow = match step {
                Step::Command(cmd) => self.on_command(cmd).await,
                Step::Queue(evt) => self.apply(evt).await,
                Step::Player(PlayerEvent::StateChanged { play_id, status }) => {
                    tracing::debug!(session = %self.session_id, play_id, ?status, "播放器状态变化");
                    self.apply(QueueEvent::PlayerChanged { play_id, status }).await
                }
                Step::Player(PlayerEvent::Error { play_id, message }) => {
                    tracing::warn!(session = %self.session_id, play_id, err = %message, "播放出错");
                    self.apply(QueueEvent::PlayerFailed { play_id, message }).await
                }
                Step::Transport(status) => {
                    tracing::debug!(
                        session = %self.session_id,
                        ?status,
                        attempts = self.supervisor.attempts(),
                        "传输状态变化"
                    );
                    let effects = self.supervisor.on_status(status);
                    self.run_supervisor_effects(effects).await
                }
                Step::Rejoin(attempt) => {
                    self.rejoin_at = None;
                    tracing::info!(session = %self.session_id, attempt, "尝试重连");
                    if let Err(e) = self.transport.rejoin().await {
                        tracing::warn!(session = %self.session_id, attempt, err = %e, "重连失败");
                    }
                    Flow::Continue
                }
                Step::ReadyTimeout => {
                    self.ready_deadline = None;
                    let effects = self.supervisor.on_ready_timeout();
                    self.run_supervisor_effects(effects).await
                }
                Step::HandlesGone => Flow::Exit,
            };
        }

        self.teardown().await;
    }

    async fn on_command(&mut self, cmd: QueueCommand) -> Flow {
        match cmd {
            QueueCommand::Enqueue(tracks) => self.apply(QueueEvent::Enqueue(tracks)).await,
            QueueCommand::Stop => self.apply(QueueEvent::Stop).await,
            QueueCommand::Shuffle => self.apply(QueueEvent::Shuffle).await,
            QueueCommand::SetLoop(on) => self.apply(QueueEvent::SetLoop(on)).await,
            QueueCommand::Skip => self.apply(QueueEvent::Skip).await,
            QueueCommand::SetVolume(volume) => self.apply(QueueEvent::SetVolume(volume)).await,
            QueueCommand::SetMuted(muted) => self.apply(QueueEvent::SetMuted(muted)).await,
            QueueCommand::AttachRadio(radio) => {
                self.radio = Some(radio);
                self.apply(QueueEvent::AttachRadio).await
            }
            QueueCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot());
                Flow::Continue
            }
        }
    }

    async fn apply(&mut self, event: QueueEvent) -> Flow {
        let mut fx = QueueEffects::default();
        self.state.apply(event, &mut fx);
        self.run_queue_effects(fx).await
    }

    async fn run_queue_effects(&mut self, fx: QueueEffects) -> Flow {
        for effect in fx.into_vec() {
            match effect {
                QueueEffect::StartLoad {
                    generation,
                    track,
                    should_cache,
                } => self.spawn_load(generation, track, should_cache),
                QueueEffect::Prefetch(track) => self.loader.downloads().prefetch(track),
                QueueEffect::Play { play_id, resource } => {
                    self.player.play(play_id, resource).await;
                }
                QueueEffect::StopPlayer => self.player.stop().await,
                QueueEffect::ApplyVolume(level) => self.player.set_volume(level).await,
                QueueEffect::ArmIdleTimer => {
                    self.idle_deadline = Some(Instant::now() + self.idle_timeout);
                }
                QueueEffect::CancelIdleTimer => self.idle_deadline = None,
                QueueEffect::RequestRadioTrack { generation } => {
                    self.spawn_radio_request(generation)
                }
                QueueEffect::DetachRadio => self.radio = None,
                QueueEffect::Notice(notice) => self.notify(notice),
                QueueEffect::Teardown => return Flow::Exit,
            }
        }
        Flow::Continue
    }

    async fn run_supervisor_effects(&mut self, effects: Vec<SupervisorEffect>) -> Flow {
        for effect in effects {
            match effect {
                SupervisorEffect::ScheduleRejoin { attempt, delay } => {
                    self.rejoin_at = Some((Instant::now() + delay, attempt));
                }
                SupervisorEffect::AwaitReady { timeout } => {
                    self.ready_deadline = Some(Instant::now() + timeout);
                }
                SupervisorEffect::CancelRejoin => self.rejoin_at = None,
                SupervisorEffect::CancelReadyWait => self.ready_deadline = None,
                SupervisorEffect::Destroy(reason) => {
                    tracing::warn!(session = %self.session_id, reason = %reason, "结束语音连接");
                    self.destroy_transport().await;
                    return Flow::Exit;
                }
                SupervisorEffect::StopQueue(reason) => {
                    tracing::info!(session = %self.session_id, reason = %reason, "停止播放队列");
                    if let Flow::Exit = self.apply(QueueEvent::Stop).await {
                        return Flow::Exit;
                    }
                }
                SupervisorEffect::Teardown => {
                    self.transport_destroyed = true;
                    return Flow::Exit;
                }
            }
        }
        Flow::Continue
    }

    fn spawn_load(&self, generation: u64, track: Track, should_cache: bool) {
        let loader = self.loader.clone();
        let tx = self.tx_internal.clone();
        let notices = self.notices.clone();
        let session = self.session_id.clone();

        tokio::spawn(async move {
            let title = track.display_title();
            let progress = |progress: LoadProgress| {
                let _ = notices.send(QueueNotice::LoadProgress {
                    title: title.clone(),
                    progress,
                });
            };
            let result = loader
                .load_with_retry(&track, should_cache, &progress)
                .await
                .map_err(|e| e.to_string());
            if let Err(e) = &result {
                tracing::warn!(session = %session, title = %title, err = %e, "曲目加载失败");
            }
            // actor 已退出时资源随 send 失败一起被 drop
            let _ = tx.send(QueueEvent::Loaded { generation, result }).await;
        });
    }

    fn spawn_radio_request(&mut self, generation: u64) {
        let tx = self.tx_internal.clone();
        let seed = self.radio.as_mut().and_then(|radio| radio.next_seed());
        let Some(seed) = seed else {
            tracing::info!(session = %self.session_id, "电台已耗尽");
            tokio::spawn(async move {
                let track = None;
                let _ = tx.send(QueueEvent::RadioTrack { generation, track }).await;
            });
            return;
        };

        let resolver = self.resolver.clone();
        let notices = self.notices.clone();
        let session = self.session_id.clone();
        tokio::spawn(async move {
            let track = match resolver.resolve(&seed).await {
                Ok(track) => Some(track.requested_by(RADIO_REQUESTER)),
                Err(e) => {
                    tracing::warn!(session = %session, seed = %seed, err = %e, "电台曲目解析失败");
                    let _ = notices.send(QueueNotice::TrackFailed {
                        title: seed,
                        reason: e.to_string(),
                    });
                    None
                }
            };
            let _ = tx.send(QueueEvent::RadioTrack { generation, track }).await;
        });
    }

    fn notify(&self, notice: QueueNotice) {
        tracing::debug!(session = %self.session_id, ?notice, "队列通知");
        let _ = self.notices.send(notice);
    }

    async fn destroy_transport(&mut self) {
        if !self.transport_destroyed {
            self.transport_destroyed = true;
            self.transport.destroy().await;
        }
    }

    async fn teardown(mut self) {
        if self.state.current_play().is_some() {
            self.player.stop().await;
        }
        self.destroy_transport().await;
        self.registry.remove(&self.session_id, self.instance);
        self.notify(QueueNotice::LeftChannel);
        tracing::info!(session = %self.session_id, "播放会话已结束");
    }
}
