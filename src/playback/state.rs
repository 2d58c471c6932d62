//! 播放队列的纯状态机
//!
//! `apply` 只修改状态并产出副作用，不做任何 IO；副作用由 actor 执行，
//! 执行结果（加载完成、播放器事件、电台曲目）再作为事件送回来。

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;

use super::transport::PlayerStatus;
use crate::domain::Track;
use crate::resource::{LoadProgress, ResourceHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueConfig {
    /// 超过此时长的曲目直接流式播放，不进缓存
    pub max_cache_duration_sec: f64,
    /// 停止后等待多久离开频道
    pub idle_timeout: Duration,
    /// 新会话的音量（0-100）
    pub default_volume: u8,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_cache_duration_sec: 600.0,
            idle_timeout: Duration::from_secs(300),
            default_volume: 100,
        }
    }
}

/// 给会话上层的结构化通知（不负责渲染）
#[derive(Debug, Clone, PartialEq)]
pub enum QueueNotice {
    LoadProgress { title: String, progress: LoadProgress },
    NowPlaying(Track),
    TrackFailed { title: String, reason: String },
    QueueEnded,
    RadioOver,
    LeftChannel,
}

#[derive(Debug)]
pub enum QueueEvent {
    Enqueue(Vec<Track>),
    Stop,
    Shuffle,
    SetLoop(bool),
    Skip,
    SetVolume(u8),
    SetMuted(bool),
    AttachRadio,
    /// 加载任务结束；`generation` 与发起时不一致的结果会被丢弃
    Loaded {
        generation: u64,
        result: Result<ResourceHandle, String>,
    },
    PlayerChanged {
        play_id: u64,
        status: PlayerStatus,
    },
    PlayerFailed {
        play_id: u64,
        message: String,
    },
    /// 电台给出的下一首；None 表示电台耗尽。`generation` 过期的结果会被丢弃
    RadioTrack {
        generation: u64,
        track: Option<Track>,
    },
    IdleTimeout,
}

#[derive(Debug)]
pub enum QueueEffect {
    StartLoad {
        generation: u64,
        track: Track,
        should_cache: bool,
    },
    Prefetch(Track),
    Play {
        play_id: u64,
        resource: ResourceHandle,
    },
    StopPlayer,
    /// 设置当前播放的音量，0.0-1.0
    ApplyVolume(f32),
    ArmIdleTimer,
    CancelIdleTimer,
    RequestRadioTrack {
        generation: u64,
    },
    DetachRadio,
    Notice(QueueNotice),
    Teardown,
}

#[derive(Debug, Default)]
pub struct QueueEffects {
    pub(super) actions: Vec<QueueEffect>,
}

impl QueueEffects {
    fn push(&mut self, effect: QueueEffect) {
        self.actions.push(effect);
    }

    fn notice(&mut self, notice: QueueNotice) {
        self.actions.push(QueueEffect::Notice(notice));
    }

    pub fn into_vec(self) -> Vec<QueueEffect> {
        self.actions
    }
}

/// 队列对外可见的快照
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub looping: bool,
    pub radio_attached: bool,
    pub stopped: bool,
    pub loading: bool,
    pub volume: u8,
    pub muted: bool,
    pub now_playing: Option<Track>,
}

#[derive(Debug)]
pub struct QueueState {
    config: QueueConfig,
    /// `tracks[0]` 是当前曲目
    tracks: VecDeque<Track>,
    looping: bool,
    radio_attached: bool,
    radio_pending: bool,
    radio_generation: u64,
    stopped: bool,
    /// 队列锁：同一时间最多一个加载
    loading: bool,
    generation: u64,
    player: PlayerStatus,
    current_play: Option<u64>,
    next_play_id: u64,
    idle_timer_armed: bool,
    volume: u8,
    muted: bool,
}

impl QueueState {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            tracks: VecDeque::new(),
            looping: false,
            radio_attached: false,
            radio_pending: false,
            radio_generation: 0,
            stopped: true,
            loading: false,
            generation: 0,
            player: PlayerStatus::Idle,
            current_play: None,
            next_play_id: 1,
            idle_timer_armed: false,
            volume: config.default_volume.min(100),
            muted: false,
        }
    }

    /// 会话刚建立时：空队列同样会在空闲超时后离开
    pub fn start(&mut self, fx: &mut QueueEffects) {
        self.arm_idle_timer(fx);
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn current_play(&self) -> Option<u64> {
        self.current_play
    }

    /// 实际输出音量；静音时为 0
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            f32::from(self.volume) / 100.0
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.tracks.iter().cloned().collect(),
            looping: self.looping,
            radio_attached: self.radio_attached,
            stopped: self.stopped,
            loading: self.loading,
            volume: self.volume,
            muted: self.muted,
            now_playing: self
                .current_play
                .and_then(|_| self.tracks.front().cloned()),
        }
    }

    pub fn apply(&mut self, event: QueueEvent, fx: &mut QueueEffects) {
        match event {
            QueueEvent::Enqueue(tracks) => self.enqueue(tracks, fx),
            QueueEvent::Stop => self.stop(fx),
            QueueEvent::Shuffle => self.shuffle_tail(&mut rand::thread_rng()),
            QueueEvent::SetLoop(on) => self.looping = on,
            QueueEvent::Skip => {
                // 播放器上报 Idle 后自然前进；加载中没有可跳过的播放
                if self.current_play.is_some() {
                    fx.push(QueueEffect::StopPlayer);
                }
            }
            QueueEvent::SetVolume(volume) => {
                self.volume = volume.min(100);
                self.apply_volume(fx);
            }
            QueueEvent::SetMuted(muted) => {
                self.muted = muted;
                self.apply_volume(fx);
            }
            QueueEvent::AttachRadio => self.attach_radio(fx),
            QueueEvent::Loaded { generation, result } => self.on_loaded(generation, result, fx),
            QueueEvent::PlayerChanged { play_id, status } => {
                if self.current_play != Some(play_id) {
                    tracing::debug!(play_id, ?status, "忽略过期的播放器事件");
                    return;
                }
                self.player = status;
                if status == PlayerStatus::Idle {
                    self.current_play = None;
                    self.on_track_finished(fx);
                }
            }
            QueueEvent::PlayerFailed { play_id, message } => {
                if self.current_play != Some(play_id) {
                    tracing::debug!(play_id, "忽略过期的播放器错误");
                    return;
                }
                let title = self
                    .tracks
                    .front()
                    .map(Track::display_title)
                    .unwrap_or_default();
                fx.notice(QueueNotice::TrackFailed {
                    title,
                    reason: message,
                });
                self.current_play = None;
                self.player = PlayerStatus::Idle;
                self.on_track_finished(fx);
            }
            QueueEvent::RadioTrack { generation, track } => {
                self.on_radio_track(generation, track, fx)
            }
            QueueEvent::IdleTimeout => {
                if self.idle_timer_armed {
                    self.idle_timer_armed = false;
                    fx.push(QueueEffect::Teardown);
                }
            }
        }
    }

    /// Fisher–Yates 打乱 `tracks[1..]`，当前曲目不动
    pub fn shuffle_tail<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.tracks.len() < 3 {
            return;
        }
        self.tracks.make_contiguous()[1..].shuffle(rng);
    }

    fn enqueue(&mut self, tracks: Vec<Track>, fx: &mut QueueEffects) {
        if tracks.is_empty() {
            return;
        }
        self.tracks.extend(tracks);
        self.stopped = false;
        self.cancel_idle_timer(fx);
        self.advance(fx);
    }

    fn stop(&mut self, fx: &mut QueueEffects) {
        if self.stopped {
            return;
        }
        self.tracks.clear();
        self.looping = false;
        if self.radio_attached || self.radio_pending {
            fx.push(QueueEffect::DetachRadio);
        }
        self.radio_attached = false;
        self.radio_pending = false;
        self.radio_generation += 1;
        self.loading = false;
        // 进行中的加载结果作废
        self.generation += 1;
        self.stopped = true;
        if self.current_play.take().is_some() {
            fx.push(QueueEffect::StopPlayer);
        }
        self.player = PlayerStatus::Idle;
        fx.notice(QueueNotice::QueueEnded);
        self.arm_idle_timer(fx);
    }

    fn attach_radio(&mut self, fx: &mut QueueEffects) {
        // 新电台替换旧电台，旧电台尚未返回的结果作废
        self.radio_attached = true;
        self.radio_pending = false;
        self.radio_generation += 1;
        self.stopped = false;
        self.cancel_idle_timer(fx);
        if self.tracks.is_empty() && !self.loading && self.current_play.is_none() {
            self.request_radio(fx);
        }
    }

    fn advance(&mut self, fx: &mut QueueEffects) {
        if self.loading || self.stopped || self.current_play.is_some() {
            return;
        }
        if self.player != PlayerStatus::Idle {
            return;
        }
        let Some(head) = self.tracks.front() else {
            return;
        };

        self.loading = true;
        self.generation += 1;

        let max = self.config.max_cache_duration_sec;
        if let Some(next) = self.tracks.get(1)
            && next.fits_cache(max)
        {
            fx.push(QueueEffect::Prefetch(next.clone()));
        }
        fx.push(QueueEffect::StartLoad {
            generation: self.generation,
            track: head.clone(),
            should_cache: head.fits_cache(max),
        });
    }

    fn on_loaded(
        &mut self,
        generation: u64,
        result: Result<ResourceHandle, String>,
        fx: &mut QueueEffects,
    ) {
        if !self.loading || generation != self.generation {
            // 资源在这里被 drop，流式资源的拉取进程随之结束
            tracing::debug!(generation, current = self.generation, "丢弃过期的加载结果");
            return;
        }
        self.loading = false;

        match result {
            Ok(resource) => {
                let Some(head) = self.tracks.front() else {
                    return;
                };
                let play_id = self.next_play_id;
                self.next_play_id += 1;
                self.current_play = Some(play_id);
                let head = head.clone();
                fx.push(QueueEffect::Play { play_id, resource });
                fx.push(QueueEffect::ApplyVolume(self.effective_volume()));
                fx.notice(QueueNotice::NowPlaying(head));
            }
            Err(reason) => {
                if let Some(failed) = self.tracks.pop_front() {
                    fx.notice(QueueNotice::TrackFailed {
                        title: failed.display_title(),
                        reason,
                    });
                }
                if self.tracks.is_empty() {
                    self.on_empty(fx);
                } else {
                    self.advance(fx);
                }
            }
        }
    }

    fn on_track_finished(&mut self, fx: &mut QueueEffects) {
        if let Some(head) = self.tracks.pop_front()
            && self.looping
        {
            self.tracks.push_back(head);
        }
        if self.tracks.is_empty() {
            self.on_empty(fx);
        } else {
            self.advance(fx);
        }
    }

    fn on_empty(&mut self, fx: &mut QueueEffects) {
        if self.radio_attached {
            self.request_radio(fx);
        } else {
            self.stop(fx);
        }
    }

    fn apply_volume(&self, fx: &mut QueueEffects) {
        if self.current_play.is_some() {
            fx.push(QueueEffect::ApplyVolume(self.effective_volume()));
        }
    }

    fn request_radio(&mut self, fx: &mut QueueEffects) {
        if !self.radio_pending {
            self.radio_pending = true;
            fx.push(QueueEffect::RequestRadioTrack {
                generation: self.radio_generation,
            });
        }
    }

    fn on_radio_track(&mut self, generation: u64, track: Option<Track>, fx: &mut QueueEffects) {
        if generation != self.radio_generation {
            tracing::debug!(generation, current = self.radio_generation, "丢弃过期的电台结果");
            return;
        }
        self.radio_pending = false;
        if !self.radio_attached {
            return;
        }
        match track {
            Some(track) => {
                self.tracks.push_back(track);
                self.advance(fx);
            }
            None => {
                self.radio_attached = false;
                fx.notice(QueueNotice::RadioOver);
                fx.push(QueueEffect::DetachRadio);
                if self.tracks.is_empty() && self.current_play.is_none() && !self.loading {
                    self.stop(fx);
                }
            }
        }
    }

    fn arm_idle_timer(&mut self, fx: &mut QueueEffects) {
        self.idle_timer_armed = true;
        fx.push(QueueEffect::ArmIdleTimer);
    }

    fn cancel_idle_timer(&mut self, fx: &mut QueueEffects) {
        if self.idle_timer_armed {
            self.idle_timer_armed = false;
            fx.push(QueueEffect::CancelIdleTimer);
        }
    }
}
