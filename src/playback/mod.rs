//! 会话播放：队列状态机、连接监督与会话注册表

mod queue;
mod radio;
mod registry;
mod state;
mod supervisor;
mod transport;

pub use queue::PlaybackQueue;
pub use radio::{RadioSession, SeedList};
pub use registry::SessionRegistry;
pub use state::{
    QueueConfig, QueueEffect, QueueEffects, QueueEvent, QueueNotice, QueueSnapshot, QueueState,
};
pub use supervisor::{SupervisorConfig, SupervisorEffect, SupervisorState};
pub use transport::{
    Player, PlayerEvent, PlayerStatus, TrackResolver, Transport, TransportLink, TransportProvider,
    TransportStatus,
};
