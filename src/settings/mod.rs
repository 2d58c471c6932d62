pub mod store;

pub use store::{PlaybackSettings, load_settings, save_settings};
