use serde::{Deserialize, Serialize};
use std::fmt;

/// 缓存/去重使用的内容 key，从曲目 URL 中解析出的稳定外部 id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

const YOUTUBE_ID_LEN: usize = 11;

impl ContentKey {
    /// 从来源 URL 解析 key；无法解析时返回 None
    pub fn from_url(url: &str) -> Option<Self> {
        extract_youtube_id(url.trim()).map(|id| Self(id.to_owned()))
    }

    /// 从缓存文件名（去掉扩展名）恢复 key
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        if !stem.is_empty() && stem.chars().all(is_id_char) {
            Some(Self(stem.to_owned()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self, ext: &str) -> String {
        format!("{}.{ext}", self.0)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn extract_youtube_id(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("//"))
        .unwrap_or(url);

    let (host, path) = match rest.find(['/', '?', '#']) {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let host = host.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .or_else(|| host.strip_prefix("music."))
        .unwrap_or(&host);

    match host {
        "youtu.be" => take_id(path.strip_prefix('/')?),
        "youtube.com" | "youtube-nocookie.com" => {
            let (route, query) = path.split_once('?').unwrap_or((path, ""));
            if route == "/watch" || route == "/watch/" {
                return query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("v="))
                    .and_then(take_id);
            }
            ["/embed/", "/v/", "/shorts/", "/live/"]
                .iter()
                .find_map(|prefix| route.strip_prefix(prefix))
                .and_then(take_id)
        }
        _ => None,
    }
}

fn take_id(s: &str) -> Option<&str> {
    let end = s.find(|c: char| !is_id_char(c)).unwrap_or(s.len());
    let id = &s[..end];
    (id.len() == YOUTUBE_ID_LEN).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> Option<String> {
        ContentKey::from_url(url).map(|k| k.to_string())
    }

    #[test]
    fn test_extracts_from_common_url_shapes() {
        let id = Some("dQw4w9WgXcQ".to_owned());
        assert_eq!(key("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), id);
        assert_eq!(key("https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42"), id);
        assert_eq!(key("http://m.youtube.com/watch?v=dQw4w9WgXcQ#t=1"), id);
        assert_eq!(key("https://youtu.be/dQw4w9WgXcQ?si=abc"), id);
        assert_eq!(key("youtu.be/dQw4w9WgXcQ"), id);
        assert_eq!(key("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(key("https://www.youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(key("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD"), id);
    }

    #[test]
    fn test_rejects_unrelated_or_malformed() {
        assert_eq!(key("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"), None);
        assert_eq!(key("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(key("https://www.youtube.com/playlist?list=PL123"), None);
        assert_eq!(key("https://notyoutube.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(key(""), None);
    }

    #[test]
    fn test_same_video_same_key() {
        let a = ContentKey::from_url("https://youtu.be/dQw4w9WgXcQ");
        let b = ContentKey::from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_file_stem_roundtrip() {
        let k = ContentKey::from_url("https://youtu.be/dQw4w9WgXcQ").unwrap();
        let name = k.file_name("opus");
        assert_eq!(name, "dQw4w9WgXcQ.opus");
        assert_eq!(ContentKey::from_file_stem("dQw4w9WgXcQ"), Some(k));
        assert_eq!(ContentKey::from_file_stem("dQw4w9WgXcQ.abc"), None);
    }
}
