use std::path::Path;
use std::process::Command;

use super::MediaProbe;
use crate::Result;

const FALLBACK_WIDTH: u32 = 1280;
const FALLBACK_HEIGHT: u32 = 720;

/// Geometry and length reported to the transport for a video upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: u64,
}

impl VideoDimensions {
    /// Values declared by the probe, with 1280x720 and zero length when absent
    pub fn from_probe(probe: &MediaProbe) -> Self {
        Self {
            width: probe.raw_width.unwrap_or(FALLBACK_WIDTH),
            height: probe.raw_height.unwrap_or(FALLBACK_HEIGHT),
            duration_seconds: probe.duration_seconds.unwrap_or(0),
        }
    }
}

/// Read the first video stream of a local file with ffprobe.
///
/// Blocks while ffprobe runs; call it from the worker pool.
pub fn inspect_video(path: &Path) -> Result<VideoDimensions> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
            "-select_streams", "v:0",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to analyze file with ffprobe: {}", error);
    }

    let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    parse_ffprobe_json(&info)
}

pub(crate) fn parse_ffprobe_json(info: &serde_json::Value) -> Result<VideoDimensions> {
    let stream = info["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or_else(|| anyhow::anyhow!("No video stream found"))?;

    let width = stream["width"].as_u64().filter(|w| *w > 0);
    let height = stream["height"].as_u64().filter(|h| *h > 0);
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) => (w as u32, h as u32),
        _ => anyhow::bail!("Video stream has no dimensions"),
    };

    let duration = info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoDimensions {
        width,
        height,
        duration_seconds: duration.max(0.0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ffprobe_json() {
        let info = json!({
            "streams": [{ "codec_type": "video", "width": 1920, "height": 1080 }],
            "format": { "duration": "61.4" }
        });
        let dims = parse_ffprobe_json(&info).unwrap();
        assert_eq!(dims, VideoDimensions { width: 1920, height: 1080, duration_seconds: 61 });
    }

    #[test]
    fn test_parse_ffprobe_json_without_stream() {
        assert!(parse_ffprobe_json(&json!({ "streams": [] })).is_err());
    }

    #[test]
    fn test_fallback_dimensions() {
        let dims = VideoDimensions::from_probe(&MediaProbe::default());
        assert_eq!(dims, VideoDimensions { width: 1280, height: 720, duration_seconds: 0 });
    }
}
