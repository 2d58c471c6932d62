use serde::{Deserialize, Serialize};

use super::ids::ContentKey;

/// 附加的曲目元数据（电台曲目会携带）
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub artist: String,
    pub title: String,
    /// 外部曲库中的 id（例如电台种子的来源 id）
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub url: String,
    pub title: String,
    pub duration_sec: f64,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub metadata: Option<TrackMetadata>,
}

impl Track {
    pub fn new(url: impl Into<String>, title: impl Into<String>, duration_sec: f64) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration_sec,
            requested_by: None,
            metadata: None,
        }
    }

    pub fn requested_by(mut self, who: impl Into<String>) -> Self {
        self.requested_by = Some(who.into());
        self
    }

    pub fn content_key(&self) -> Option<ContentKey> {
        ContentKey::from_url(&self.url)
    }

    /// 时长是否在缓存阈值内（超长曲目走直接流式播放）
    pub fn fits_cache(&self, max_cache_duration_sec: f64) -> bool {
        self.duration_sec <= max_cache_duration_sec
    }

    /// 展示用标题：优先使用元数据中的 "artist - title"
    pub fn display_title(&self) -> String {
        match &self.metadata {
            Some(m) if !m.artist.is_empty() => format!("{} - {}", m.artist, m.title),
            Some(m) if !m.title.is_empty() => m.title.clone(),
            _ => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_cache_is_inclusive() {
        let t = Track::new("https://youtu.be/dQw4w9WgXcQ", "a", 600.0);
        assert!(t.fits_cache(600.0));
        assert!(!Track { duration_sec: 600.5, ..t }.fits_cache(600.0));
    }

    #[test]
    fn test_display_title_prefers_metadata() {
        let mut t = Track::new("https://youtu.be/dQw4w9WgXcQ", "Some Video (Official)", 200.0);
        assert_eq!(t.display_title(), "Some Video (Official)");

        t.metadata = Some(TrackMetadata {
            artist: "Artist".to_owned(),
            title: "Song".to_owned(),
            external_id: None,
        });
        assert_eq!(t.display_title(), "Artist - Song");
    }
}
