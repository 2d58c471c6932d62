//! 语音传输 / 播放器 / 曲目解析的外部边界

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::Track;
use crate::error::{ResolveError, TransportError};
use crate::resource::ResourceHandle;

/// 传输层状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Signalling,
    Connecting,
    Ready,
    /// `kicked` 为 true 表示被移出频道，不应重连
    Disconnected { kicked: bool },
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    #[default]
    Idle,
    Buffering,
    Playing,
}

/// 播放器事件；`play_id` 对应 [`Player::play`] 传入的 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    StateChanged { play_id: u64, status: PlayerStatus },
    Error { play_id: u64, message: String },
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn rejoin(&self) -> Result<(), TransportError>;
    async fn destroy(&self);
}

#[async_trait]
pub trait Player: Send + Sync {
    /// 开始播放；之后的状态通过 [`PlayerEvent`] 上报
    async fn play(&self, play_id: u64, resource: ResourceHandle);
    async fn stop(&self);
    /// 设置当前播放的音量，`level` 为 0.0-1.0 的感知音量（对数换算由播放器负责）
    async fn set_volume(&self, level: f32);
}

/// 一次连接得到的全部句柄
pub struct TransportLink {
    pub transport: Arc<dyn Transport>,
    pub player: Arc<dyn Player>,
    pub transport_events: mpsc::Receiver<TransportStatus>,
    pub player_events: mpsc::Receiver<PlayerEvent>,
}

#[async_trait]
pub trait TransportProvider: Send + Sync {
    async fn connect(&self, channel: &str) -> Result<TransportLink, TransportError>;
}

/// 把用户输入（搜索词或外部链接）解析为曲目
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Track, ResolveError>;
}
