use std::time::Duration;

use super::transport::TransportStatus;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub max_rejoin_attempts: u32,
    /// 第 n 次重连前等待 `n * rejoin_step`
    pub rejoin_step: Duration,
    pub ready_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_rejoin_attempts: 5,
            rejoin_step: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEffect {
    ScheduleRejoin { attempt: u32, delay: Duration },
    CancelRejoin,
    AwaitReady { timeout: Duration },
    CancelReadyWait,
    /// 主动销毁传输并结束会话
    Destroy(TransportError),
    /// 被踢出：停止队列，不再重连
    StopQueue(TransportError),
    /// 传输已被外部销毁，结束会话
    Teardown,
}

/// 连接监督器：根据传输状态决定重连、等待就绪或销毁
#[derive(Debug)]
pub struct SupervisorState {
    config: SupervisorConfig,
    attempts: u32,
    awaiting_ready: bool,
    /// 被踢出后不再响应任何断线
    kicked: bool,
    destroyed: bool,
}

impl SupervisorState {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            attempts: 0,
            awaiting_ready: false,
            kicked: false,
            destroyed: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_status(&mut self, status: TransportStatus) -> Vec<SupervisorEffect> {
        match status {
            TransportStatus::Disconnected { kicked: true } => {
                if self.kicked || self.destroyed {
                    return Vec::new();
                }
                tracing::info!("已被移出频道，停止播放");
                self.kicked = true;
                let mut effects = vec![SupervisorEffect::CancelRejoin];
                if self.awaiting_ready {
                    self.awaiting_ready = false;
                    effects.push(SupervisorEffect::CancelReadyWait);
                }
                effects.push(SupervisorEffect::StopQueue(TransportError::TerminalDisconnect));
                effects
            }
            TransportStatus::Disconnected { kicked: false } => {
                if self.kicked || self.destroyed {
                    return Vec::new();
                }
                if self.attempts < self.config.max_rejoin_attempts {
                    self.attempts += 1;
                    let delay = self.config.rejoin_step * self.attempts;
                    tracing::info!(
                        attempt = self.attempts,
                        delay_secs = delay.as_secs(),
                        "连接断开，准备重连"
                    );
                    vec![SupervisorEffect::ScheduleRejoin {
                        attempt: self.attempts,
                        delay,
                    }]
                } else {
                    tracing::warn!(attempts = self.attempts, "重连次数耗尽，销毁连接");
                    self.destroyed = true;
                    self.awaiting_ready = false;
                    vec![SupervisorEffect::Destroy(TransportError::Lost(format!(
                        "{} 次重连均未恢复",
                        self.attempts
                    )))]
                }
            }
            TransportStatus::Signalling | TransportStatus::Connecting => {
                if self.kicked || self.destroyed || self.awaiting_ready {
                    return Vec::new();
                }
                self.awaiting_ready = true;
                vec![SupervisorEffect::AwaitReady {
                    timeout: self.config.ready_timeout,
                }]
            }
            TransportStatus::Ready => {
                self.attempts = 0;
                if self.awaiting_ready {
                    self.awaiting_ready = false;
                    vec![SupervisorEffect::CancelReadyWait]
                } else {
                    Vec::new()
                }
            }
            TransportStatus::Destroyed => {
                self.awaiting_ready = false;
                self.destroyed = true;
                vec![SupervisorEffect::Teardown]
            }
        }
    }

    /// 就绪等待超时
    pub fn on_ready_timeout(&mut self) -> Vec<SupervisorEffect> {
        if !self.awaiting_ready {
            return Vec::new();
        }
        self.awaiting_ready = false;
        if self.destroyed {
            return Vec::new();
        }
        tracing::warn!(
            timeout_secs = self.config.ready_timeout.as_secs(),
            "等待连接就绪超时，销毁连接"
        );
        self.destroyed = true;
        vec![SupervisorEffect::Destroy(TransportError::ReadyTimeout {
            secs: self.config.ready_timeout.as_secs(),
        })]
    }
}
