pub mod audio_cache;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod playback;
pub mod resource;
pub mod settings;
