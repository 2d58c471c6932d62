pub mod ids;
pub mod model;

pub use ids::ContentKey;
pub use model::{Track, TrackMetadata};
