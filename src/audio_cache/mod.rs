//! 音频内容缓存：目录即索引，按内容 key 去重下载，按预算淘汰

mod coordinator;
mod store;
mod validate;

pub use coordinator::DownloadCoordinator;
pub use store::{CacheConfig, CacheEntry, CacheStore, EvictionReport};
pub use validate::{DurationProbe, FfprobeProbe, check_duration};
