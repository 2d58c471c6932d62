//! 统一错误处理模块
//!
//! 每个关注点一个结构化错误类型，替代 String 错误。

mod app;
mod cache;
mod download;
mod fetch;
mod load;
mod resolve;
mod transport;

// 重新导出所有错误类型，便于使用
pub use app::AppError;
pub use cache::CacheError;
pub use download::DownloadError;
pub use fetch::FetchError;
pub use load::LoadError;
pub use resolve::ResolveError;
pub use transport::{QueueError, TransportError};
