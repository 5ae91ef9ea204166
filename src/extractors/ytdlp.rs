use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{Extractor, FetchRequest, MediaKind, MediaProbe, ProbeRequest, TransferSample};
use crate::Result;

const PROGRESS_PREFIX: &str = "relay-progress";

/// Extractor backed by the yt-dlp executable
pub struct YtDlpExtractor {
    yt_dlp_path: String,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::with_path("yt-dlp")
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: path.into(),
        }
    }

    fn cookie_args(cookie_file: Option<&Path>) -> Vec<String> {
        match cookie_file {
            Some(path) => vec!["--cookies".to_string(), path.to_string_lossy().into_owned()],
            None => Vec::new(),
        }
    }

    /// Arguments for the payload download
    fn fetch_args(request: &FetchRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--quiet".into(),
            "--progress".into(),
            "--newline".into(),
            "--progress-template".into(),
            format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_PREFIX
            ),
        ];

        // yt-dlp names the download after the source extension and the postprocessor
        // rewrites it to the final one; a fixed extension here would be doubled
        let template = request.output_path.with_extension("%(ext)s");
        match request.kind {
            MediaKind::Audio => {
                args.extend([
                    "--format".into(),
                    "bestaudio/best".into(),
                    "--extract-audio".into(),
                    "--audio-format".into(),
                    "mp3".into(),
                    "--audio-quality".into(),
                    "192K".into(),
                    "--output".into(),
                    template.to_string_lossy().into_owned(),
                ]);
            }
            MediaKind::Video => {
                args.extend([
                    "--format".into(),
                    "best[height<=1080]".into(),
                    "--recode-video".into(),
                    "mp4".into(),
                    "--output".into(),
                    template.to_string_lossy().into_owned(),
                ]);
            }
        }

        args.extend(Self::cookie_args(request.cookie_file.as_deref()));
        args.push(request.url.clone());
        args
    }
}

/// Parse one `--progress-template` line into a transfer sample
pub(crate) fn parse_progress_line(line: &str) -> Option<TransferSample> {
    let mut parts = line.split_whitespace();
    if parts.next()? != PROGRESS_PREFIX {
        return None;
    }

    let number = |field: Option<&str>| {
        field
            .and_then(|f| f.parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .map(|v| v as u64)
    };

    let bytes_done = number(parts.next()).unwrap_or(0);
    let total = number(parts.next());
    let estimate = number(parts.next());

    Some(TransferSample {
        bytes_done,
        bytes_total: total.or(estimate),
    })
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn probe(&self, request: &ProbeRequest) -> Result<MediaProbe> {
        tracing::debug!("Probing {} metadata for: {}", request.kind, request.url);

        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(Self::cookie_args(request.cookie_file.as_deref()));
        args.push(request.url.clone());

        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: Value = serde_json::from_str(&json_str)?;

        Ok(MediaProbe::from_info_json(&info))
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: mpsc::UnboundedSender<TransferSample>,
    ) -> Result<()> {
        let args = Self::fetch_args(request);
        tracing::debug!("Running {} {:?}", self.yt_dlp_path, args);

        let mut child = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(sample) = parse_progress_line(&line) {
                    // Receiver may be gone once the job stopped caring about progress
                    let _ = progress.send(sample);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            anyhow::bail!("Failed to download {}: {}", request.kind, stderr.trim());
        }

        Ok(())
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_progress_line() {
        let sample = parse_progress_line("relay-progress 1024 4096 NA").unwrap();
        assert_eq!(sample.bytes_done, 1024);
        assert_eq!(sample.bytes_total, Some(4096));

        let estimated = parse_progress_line("relay-progress 10 NA 500.5").unwrap();
        assert_eq!(estimated.bytes_total, Some(500));

        let unknown = parse_progress_line("relay-progress NA NA NA").unwrap();
        assert_eq!(unknown.bytes_done, 0);
        assert_eq!(unknown.bytes_total, None);

        assert!(parse_progress_line("[download] Destination: x.mp4").is_none());
    }

    #[test]
    fn test_audio_fetch_args_use_extension_template() {
        let request = FetchRequest {
            url: "https://youtu.be/abc".into(),
            kind: MediaKind::Audio,
            cookie_file: Some(PathBuf::from("/tmp/cookies_x.txt")),
            output_path: PathBuf::from("/tmp/audio_1234.mp3"),
        };

        let args = YtDlpExtractor::fetch_args(&request);
        assert!(args.contains(&"/tmp/audio_1234.%(ext)s".to_string()));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--cookies" && w[1] == "/tmp/cookies_x.txt"));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn test_video_fetch_args() {
        let request = FetchRequest {
            url: "https://example.com/v".into(),
            kind: MediaKind::Video,
            cookie_file: None,
            output_path: PathBuf::from("/tmp/video_1234.mp4"),
        };

        let args = YtDlpExtractor::fetch_args(&request);
        assert!(args.contains(&"best[height<=1080]".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--output" && w[1] == "/tmp/video_1234.%(ext)s"));
        assert!(!args.contains(&"/tmp/video_1234.mp4".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--recode-video" && w[1] == "mp4"));
        assert!(!args.contains(&"--cookies".to_string()));
    }
}
