//! 语音传输与会话相关错误

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// 建立连接失败
    #[error("连接语音频道失败: {0}")]
    Connect(String),

    /// 连接丢失（由监督器处理重连）
    #[error("语音连接丢失: {0}")]
    Lost(String),

    /// 被踢出频道，不再重连
    #[error("已被移出语音频道")]
    TerminalDisconnect,

    /// 等待 Ready 超时
    #[error("等待语音连接就绪超时 ({secs}s)")]
    ReadyTimeout { secs: u64 },
}

/// 会话句柄错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// 会话已结束（actor 已退出）
    #[error("播放会话已结束")]
    Closed,

    /// 同一会话重复加入
    #[error("会话已存在: {0}")]
    AlreadyJoined(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
