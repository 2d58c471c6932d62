//! 拉取器（子进程）相关错误

use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// 启动子进程失败
    #[error("启动 {program} 失败: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 子进程非零退出
    #[error("{program} 退出码异常: {status}")]
    Exit { program: String, status: ExitStatus },

    /// 子进程没有可读的输出
    #[error("{program} 没有产生音频流")]
    NoOutput { program: String },

    /// 期望的输出文件不存在
    #[error("拉取完成但输出文件缺失: {0}")]
    MissingOutput(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
