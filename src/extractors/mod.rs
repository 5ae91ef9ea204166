use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

pub mod ffprobe;
pub mod thumbnail;
pub mod ytdlp;

pub use thumbnail::{HttpThumbnailSource, ThumbnailSource};
pub use ytdlp::YtDlpExtractor;

use crate::Result;

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Container extension of the final artifact
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    /// Title used when the source does not report one
    pub fn default_title(&self) -> &'static str {
        match self {
            MediaKind::Audio => "Unknown Title",
            MediaKind::Video => "Unknown Video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named bundle of authentication cookies presented to the media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieProfile {
    None,
    Youtube,
    Instagram,
}

impl CookieProfile {
    /// Pick the profile for a URL by the host substrings it contains
    pub fn for_url(url: &str) -> Self {
        let url_lower = url.to_lowercase();
        if url_lower.contains("instagram.com") {
            CookieProfile::Instagram
        } else if url_lower.contains("youtube.com") || url_lower.contains("youtu.be") {
            CookieProfile::Youtube
        } else {
            CookieProfile::None
        }
    }

    /// Environment variable that may carry this profile's cookie blob
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            CookieProfile::None => None,
            CookieProfile::Youtube => Some("YT_COOKIES"),
            CookieProfile::Instagram => Some("INSTA_COOKIES"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CookieProfile::None => "none",
            CookieProfile::Youtube => "youtube",
            CookieProfile::Instagram => "instagram",
        }
    }
}

/// Metadata returned by a probe, no payload transferred
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub title: Option<String>,
    pub duration_seconds: Option<u64>,
    pub approx_size_bytes: Option<u64>,
    pub exact_size_bytes: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub raw_width: Option<u32>,
    pub raw_height: Option<u32>,
}

impl MediaProbe {
    /// Build a probe from a yt-dlp `--dump-json` document
    pub fn from_info_json(info: &serde_json::Value) -> Self {
        let non_zero = |value: Option<u64>| value.filter(|v| *v > 0);

        Self {
            title: info["title"].as_str().map(|s| s.to_string()),
            duration_seconds: info["duration"].as_f64().map(|d| d.max(0.0) as u64),
            approx_size_bytes: non_zero(info["filesize_approx"].as_f64().map(|v| v as u64)),
            exact_size_bytes: non_zero(info["filesize"].as_f64().map(|v| v as u64)),
            thumbnail_url: info["thumbnail"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            raw_width: info["width"].as_u64().map(|w| w as u32),
            raw_height: info["height"].as_u64().map(|h| h as u32),
        }
    }

    /// Larger of the two size fields, if either is known
    pub fn largest_size(&self) -> Option<u64> {
        match (self.approx_size_bytes, self.exact_size_bytes) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn title_or(&self, fallback: &str) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Metadata-only query
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub url: String,
    pub kind: MediaKind,
    pub cookie_file: Option<PathBuf>,
}

/// Payload download into `output_path`
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub kind: MediaKind,
    pub cookie_file: Option<PathBuf>,
    pub output_path: PathBuf,
}

/// Raw transfer counters pushed while a download or upload runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
}

/// Resolves media URLs and downloads their payload
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetch metadata only
    async fn probe(&self, request: &ProbeRequest) -> Result<MediaProbe>;

    /// Download the payload to `request.output_path`, reporting progress when available
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::UnboundedSender<TransferSample>,
    ) -> Result<()>;
}

/// Short random file stem such as `audio_1a2b3c4d`
pub fn artifact_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let id = uuid::Uuid::new_v4().simple().to_string();
    dir.join(format!("{}_{}.{}", prefix, &id[..8], extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_profile_for_url() {
        assert_eq!(CookieProfile::for_url("https://www.youtube.com/watch?v=1"), CookieProfile::Youtube);
        assert_eq!(CookieProfile::for_url("https://youtu.be/abc"), CookieProfile::Youtube);
        assert_eq!(CookieProfile::for_url("https://www.instagram.com/reel/x"), CookieProfile::Instagram);
        assert_eq!(CookieProfile::for_url("https://vimeo.com/1"), CookieProfile::None);
    }

    #[test]
    fn test_probe_from_info_json() {
        let info = json!({
            "title": "Clip",
            "duration": 125.7,
            "filesize_approx": 1000,
            "filesize": null,
            "thumbnail": "https://i.example.com/t.jpg",
            "width": 1920,
            "height": 1080
        });

        let probe = MediaProbe::from_info_json(&info);
        assert_eq!(probe.title.as_deref(), Some("Clip"));
        assert_eq!(probe.duration_seconds, Some(125));
        assert_eq!(probe.largest_size(), Some(1000));
        assert_eq!(probe.raw_width, Some(1920));
        assert_eq!(probe.thumbnail_url.as_deref(), Some("https://i.example.com/t.jpg"));
    }

    #[test]
    fn test_zero_size_is_unknown() {
        let probe = MediaProbe::from_info_json(&json!({ "filesize": 0, "filesize_approx": 0 }));
        assert_eq!(probe.largest_size(), None);
        assert_eq!(probe.title_or("Unknown Title"), "Unknown Title");
    }

    #[test]
    fn test_artifact_path_is_unique() {
        let dir = Path::new("/tmp");
        let a = artifact_path(dir, "audio", "mp3");
        let b = artifact_path(dir, "audio", "mp3");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("audio_"));
        assert_eq!(a.extension().unwrap(), "mp3");
    }
}
