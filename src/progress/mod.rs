//! Progress snapshots for long transfers and throttled delivery of them to the chat.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::extractors::TransferSample;
use crate::transport::{MessageRef, Transport};

const BAR_LENGTH: usize = 20;
const MIB: f64 = 1024.0 * 1024.0;

/// Renderable state of one transfer; only the latest one per job is kept
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    /// `None` when the total is unknown
    pub percent: Option<f64>,
    pub speed_bytes_per_sec: f64,
    /// `None` means "unknown"
    pub eta_seconds: Option<u64>,
    pub rendered_text: String,
}

impl ProgressSnapshot {
    pub fn speed_bits_per_sec(&self) -> f64 {
        self.speed_bytes_per_sec * 8.0
    }

    pub fn eta_display(&self) -> String {
        match self.eta_seconds {
            Some(eta) => format!("{}:{:02}", eta / 60, eta % 60),
            None => "unknown".to_string(),
        }
    }
}

/// Turns raw counters into snapshots for one phase ("Downloading", "Uploading")
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    phase: String,
    footer: String,
}

impl ProgressTracker {
    pub fn new(phase: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            footer: footer.into(),
        }
    }

    pub fn sample(&self, bytes_done: u64, bytes_total: Option<u64>, started_at: Instant) -> ProgressSnapshot {
        self.sample_at(bytes_done, bytes_total, started_at, Instant::now())
    }

    pub fn sample_at(
        &self,
        bytes_done: u64,
        bytes_total: Option<u64>,
        started_at: Instant,
        now: Instant,
    ) -> ProgressSnapshot {
        let total = bytes_total.filter(|t| *t > 0);
        let percent = total.map(|t| (bytes_done as f64 / t as f64 * 100.0).min(100.0));

        let elapsed = now.saturating_duration_since(started_at).as_secs_f64();
        let speed = if elapsed > 0.0 {
            bytes_done as f64 / elapsed
        } else {
            0.0
        };

        let eta_seconds = match total {
            Some(t) if speed > 0.0 => Some((t.saturating_sub(bytes_done) as f64 / speed) as u64),
            _ => None,
        };

        let mut snapshot = ProgressSnapshot {
            bytes_done,
            bytes_total: total,
            percent,
            speed_bytes_per_sec: speed,
            eta_seconds,
            rendered_text: String::new(),
        };
        snapshot.rendered_text = self.render(&snapshot);
        snapshot
    }

    fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let mut lines = vec![
            "╭──────────────────╮".to_string(),
            format!("│    **{}**    ", self.phase),
            "├──────────────────".to_string(),
        ];

        let done_mb = snapshot.bytes_done as f64 / MIB;
        match (snapshot.percent, snapshot.bytes_total) {
            (Some(percent), Some(total)) => {
                lines.push(format!("│ {} {:.1}%", progress_bar(percent), percent));
                lines.push(format!("│ {:.2}MB / {:.2}MB", done_mb, total as f64 / MIB));
            }
            _ => lines.push(format!("│ {:.2}MB", done_mb)),
        }

        lines.push(format!("│ Speed: {:.2} Mbps", snapshot.speed_bits_per_sec() / MIB));
        lines.push(format!("│ ETA: {}", snapshot.eta_display()));
        lines.push("╰──────────────────╯".to_string());

        let mut text = lines.join("\n");
        if !self.footer.is_empty() {
            text.push_str(&format!("\n\n**{}**", self.footer));
        }
        text
    }
}

fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_LENGTH as f64).floor() as usize;
    let filled = filled.min(BAR_LENGTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_LENGTH - filled))
}

/// Pushes snapshots to the progress message, at most once per interval.
///
/// Edit failures are logged and dropped; progress is cosmetic.
pub struct ProgressReporter {
    tracker: ProgressTracker,
    transport: Arc<dyn Transport>,
    message: MessageRef,
    started_at: Instant,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    latest: Option<ProgressSnapshot>,
}

impl ProgressReporter {
    pub fn new(
        tracker: ProgressTracker,
        transport: Arc<dyn Transport>,
        message: MessageRef,
        interval: Duration,
    ) -> Self {
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            tracker,
            transport,
            message,
            started_at: Instant::now(),
            limiter: RateLimiter::direct(quota),
            latest: None,
        }
    }

    pub fn latest(&self) -> Option<&ProgressSnapshot> {
        self.latest.as_ref()
    }

    /// Record a sample and edit the message if the limiter allows it
    pub async fn push(&mut self, sample: TransferSample) {
        let snapshot = self
            .tracker
            .sample(sample.bytes_done, sample.bytes_total, self.started_at);
        let finished = snapshot.percent.is_some_and(|p| p >= 100.0);

        if finished || self.limiter.check().is_ok() {
            if let Err(e) = self
                .transport
                .edit_message(&self.message, &snapshot.rendered_text)
                .await
            {
                tracing::debug!("Progress update dropped: {}", e);
            }
        }

        self.latest = Some(snapshot);
    }

    /// Drain samples until every sender is dropped
    pub async fn run(mut self, mut samples: mpsc::UnboundedReceiver<TransferSample>) -> Option<ProgressSnapshot> {
        while let Some(sample) = samples.recv().await {
            self.push(sample).await;
        }
        self.latest
    }
}
