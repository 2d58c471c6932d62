use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::Child;

use crate::error::FetchError;

/// 流式音频资源
///
/// 持有拉取子进程（如果有）：读取出错或被 drop 时结束子进程，避免泄漏。
pub struct AudioStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    child: Option<Child>,
}

impl AudioStream {
    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            reader: Box::pin(reader),
            child: None,
        }
    }

    pub(crate) fn from_child(mut child: Child, program: &str) -> Result<Self, FetchError> {
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(FetchError::NoOutput {
                program: program.to_owned(),
            });
        };
        Ok(Self {
            reader: Box::pin(stdout),
            child: Some(child),
        })
    }

    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    fn terminate(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        if let Err(e) = child.start_kill() {
            tracing::debug!(err = %e, "结束拉取进程失败");
        } else {
            tracing::debug!(pid = ?child.id(), "已结束拉取进程");
        }
    }
}

impl AsyncRead for AudioStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.reader.as_mut().poll_read(cx, buf) {
            Poll::Ready(Err(e)) => {
                this.terminate();
                Poll::Ready(Err(e))
            }
            other => other,
        }
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("pid", &self.child.as_ref().and_then(|c| c.id()))
            .finish_non_exhaustive()
    }
}
