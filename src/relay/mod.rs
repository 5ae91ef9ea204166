use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::enrich::MetadataEnricher;
use crate::extractors::ffprobe::{self, VideoDimensions};
use crate::extractors::{
    artifact_path, CookieProfile, Extractor, FetchRequest, MediaKind, MediaProbe, ProbeRequest,
    ThumbnailSource, TransferSample,
};
use crate::gate::{Job, JobGate, JobSlot};
use crate::janitor::ResourceJanitor;
use crate::policy::{self, Limits, PolicyResult, PolicyViolation};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::transport::{ChatId, MessageRef, Transport, Upload, UploadAttributes, UserId};
use crate::RelayError;

pub mod state;
pub mod workers;


pub use state::JobState;
pub use workers::WorkerPool;

/// One inbound command, resolved once at admission
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub media_kind: MediaKind,
    pub source_url: String,
    pub cookie_profile: CookieProfile,
    /// Run the duration/size check before downloading
    pub enforce_policy: bool,
}

/// How a job ended
#[derive(Debug)]
pub enum JobOutcome {
    Completed,
    /// The user already had a job running; nothing was started
    Busy,
    Rejected(PolicyViolation),
    Failed(RelayError),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

/// Runtime knobs of the orchestrator
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Where cookie, media and thumbnail files are created
    pub work_dir: PathBuf,
    pub limits: Limits,
    pub probe_timeout: Duration,
    pub progress_interval: Duration,
    /// Written as the artist tag and used as audio performer
    pub author: String,
    /// Audio comment tag
    pub comment: String,
    /// Last line of captions and progress messages
    pub footer: String,
    pub cookies: HashMap<CookieProfile, String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("media-relay"),
            limits: Limits::default(),
            probe_timeout: Duration::from_secs(15),
            progress_interval: Duration::from_secs(3),
            author: "Media Relay".to_string(),
            comment: "Processed by Media Relay".to_string(),
            footer: "Powered By Media Relay".to_string(),
            cookies: HashMap::new(),
        }
    }
}

/// Failure leaving the job in either `Rejected` or `Failed`
enum Abort {
    Rejected(PolicyViolation),
    Failed(RelayError),
}

impl From<RelayError> for Abort {
    fn from(error: RelayError) -> Self {
        Abort::Failed(error)
    }
}

/// Runs `release_all` when the job scope ends, whichever way it ends
struct CleanupScope(Arc<ResourceJanitor>);

impl Drop for CleanupScope {
    fn drop(&mut self) {
        let removed = self.0.release_all();
        tracing::debug!("Job cleanup removed {} files", removed);
    }
}

/// Per-job mutable state threaded through the phases
struct JobContext {
    request: JobRequest,
    // Field order matters: files are removed before the gate slot is released
    _cleanup: CleanupScope,
    slot: JobSlot,
    janitor: Arc<ResourceJanitor>,
    state: JobState,
    status_message: Option<MessageRef>,
}

impl JobContext {
    fn transition(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(
            user_id = self.request.user_id,
            kind = %self.request.media_kind,
            "Job {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.slot.set_status(next);
    }
}

/// Drives probe, policy check, download, tagging and upload for admitted jobs
pub struct FetchOrchestrator {
    extractor: Arc<dyn Extractor>,
    transport: Arc<dyn Transport>,
    thumbnails: Arc<dyn ThumbnailSource>,
    gate: JobGate,
    pool: WorkerPool,
    enricher: MetadataEnricher,
    settings: RelaySettings,
}

impl FetchOrchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transport: Arc<dyn Transport>,
        thumbnails: Arc<dyn ThumbnailSource>,
        gate: JobGate,
        pool: WorkerPool,
        settings: RelaySettings,
    ) -> Self {
        Self {
            enricher: MetadataEnricher::new(settings.comment.clone()),
            extractor,
            transport,
            thumbnails,
            gate,
            pool,
            settings,
        }
    }

    pub fn gate(&self) -> &JobGate {
        &self.gate
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Run one job to a terminal state. The gate slot and every temporary file are
    /// released before this returns.
    pub async fn run(&self, request: JobRequest) -> JobOutcome {
        let janitor = Arc::new(ResourceJanitor::new());
        let job = Job {
            user_id: request.user_id,
            chat_id: request.chat_id,
            media_kind: request.media_kind,
            source_url: request.source_url.clone(),
            cookie_profile: request.cookie_profile,
            created_at: Utc::now(),
            status: JobState::Admitted,
            janitor: janitor.clone(),
        };

        let Some(slot) = self.gate.try_acquire(job) else {
            let error = RelayError::AlreadyRunning(request.user_id);
            tracing::info!("Rejected {} request: {}", request.media_kind, error);
            self.say(request.chat_id, &error.user_message()).await;
            return JobOutcome::Busy;
        };
        tracing::info!(
            "Admitted {} job for user {}: {}",
            request.media_kind,
            request.user_id,
            request.source_url
        );

        let mut ctx = JobContext {
            request,
            _cleanup: CleanupScope(janitor.clone()),
            slot,
            janitor,
            state: JobState::Admitted,
            status_message: None,
        };

        match self.drive(&mut ctx).await {
            Ok(()) => {
                ctx.transition(JobState::Completed);
                if let Some(message) = ctx.status_message {
                    if let Err(e) = self.transport.delete_message(&message).await {
                        tracing::debug!("Could not delete progress message: {}", e);
                    }
                }
                JobOutcome::Completed
            }
            Err(Abort::Rejected(violation)) => {
                ctx.transition(JobState::Rejected);
                tracing::info!("Job rejected: {}", violation);
                self.notify_in_place(&ctx, &violation.user_message()).await;
                JobOutcome::Rejected(violation)
            }
            Err(Abort::Failed(error)) => {
                ctx.transition(JobState::Failed);
                tracing::error!("{} processing error: {}", ctx.request.media_kind, error);
                match error {
                    RelayError::DownloadFailed => {
                        self.notify_in_place(&ctx, &error.user_message()).await
                    }
                    _ => {
                        self.say(ctx.request.chat_id, &error.user_message()).await;
                        if let Some(message) = ctx.status_message {
                            if let Err(e) = self.transport.delete_message(&message).await {
                                tracing::debug!("Could not delete progress message: {}", e);
                            }
                        }
                    }
                }
                JobOutcome::Failed(error)
            }
        }
    }

    async fn drive(&self, ctx: &mut JobContext) -> Result<(), Abort> {
        let kind = ctx.request.media_kind;
        ctx.transition(JobState::ProbingMetadata);

        let job_dir = self
            .prepare_job_dir(&ctx.janitor)
            .map_err(|e| RelayError::ProbeFailed(format!("{:#}", e)))?;
        let cookie_file = self
            .materialize_cookies(ctx.request.cookie_profile, &job_dir, &ctx.janitor)
            .map_err(|e| RelayError::ProbeFailed(format!("{:#}", e)))?;

        let opening = match kind {
            MediaKind::Audio => "**Starting audio extraction...**",
            MediaKind::Video => "**Getting video information...**",
        };
        ctx.status_message = match self.transport.reply(ctx.request.chat_id, opening).await {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Could not send progress message: {}", e);
                None
            }
        };

        let probe = self.probe(&ctx.request, cookie_file.clone()).await?;

        if ctx.request.enforce_policy {
            ctx.transition(JobState::PolicyChecked);
            if let PolicyResult::Rejected(violation) = policy::check(&probe, &self.settings.limits) {
                return Err(Abort::Rejected(violation));
            }
        }

        let title = probe.title_or(kind.default_title());
        let media_path = artifact_path(&job_dir, kind.as_str(), kind.extension());
        ctx.janitor.register(&media_path);

        ctx.transition(JobState::Downloading);
        if kind == MediaKind::Video {
            self.edit_status(ctx, "**Downloading video...**").await;
        }

        let fetch_request = FetchRequest {
            url: ctx.request.source_url.clone(),
            kind,
            cookie_file,
            output_path: media_path.clone(),
        };
        self.with_progress(ctx.status_message, "Downloading", |tx| {
            self.extractor.fetch(&fetch_request, tx)
        })
        .await
        .map_err(|e| RelayError::FetchFailed(format!("{:#}", e)))?;

        if !media_path.exists() {
            return Err(RelayError::DownloadFailed.into());
        }

        let thumbnail_path = match probe.thumbnail_url.as_deref() {
            Some(url) => self.fetch_thumbnail(url, &job_dir, &ctx.janitor).await,
            None => None,
        };

        let attributes = match kind {
            MediaKind::Audio => {
                ctx.transition(JobState::Enriching);
                self.edit_status(ctx, "**Processing metadata...**").await;
                self.enrich(&media_path, &title, thumbnail_path.as_deref()).await;
                UploadAttributes::Audio {
                    title: title.clone(),
                    performer: self.settings.author.clone(),
                }
            }
            MediaKind::Video => {
                let dims = self.inspect(&media_path, &probe).await;
                UploadAttributes::Video {
                    duration_seconds: dims.duration_seconds,
                    width: dims.width,
                    height: dims.height,
                    supports_streaming: true,
                }
            }
        };

        ctx.transition(JobState::Uploading);
        self.edit_status(ctx, &format!("**Uploading {}...**", kind)).await;

        let chat_id = ctx.request.chat_id;
        let caption = self.caption(&title);
        // Audio cover art lives in the tags; only videos get a separate thumbnail
        let upload_thumbnail = thumbnail_path.filter(|_| kind == MediaKind::Video);
        self.with_progress(ctx.status_message, "Uploading", |tx| {
            let upload = Upload {
                file_path: media_path.clone(),
                title: title.clone(),
                caption,
                attributes: Some(attributes),
                thumbnail_path: upload_thumbnail,
                progress: Some(tx),
            };
            async move { self.transport.send_file(chat_id, &upload).await }
        })
        .await
        .map_err(|e| RelayError::UploadFailed(format!("{:#}", e)))?;

        Ok(())
    }

    async fn probe(&self, request: &JobRequest, cookie_file: Option<PathBuf>) -> Result<MediaProbe, RelayError> {
        let probe_request = ProbeRequest {
            url: request.source_url.clone(),
            kind: request.media_kind,
            cookie_file,
        };

        match tokio::time::timeout(self.settings.probe_timeout, self.extractor.probe(&probe_request)).await {
            Ok(Ok(probe)) => Ok(probe),
            Ok(Err(e)) => Err(RelayError::ProbeFailed(format!("{:#}", e))),
            Err(_) => Err(RelayError::ProbeFailed(format!(
                "metadata probe timed out after {}s",
                self.settings.probe_timeout.as_secs_f64()
            ))),
        }
    }

    /// Scratch directory owned by one job; it also catches partial files the
    /// extractor leaves behind.
    fn prepare_job_dir(&self, janitor: &ResourceJanitor) -> crate::Result<PathBuf> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.settings.work_dir.join(format!("job_{}", &id[..12]));
        fs_err::create_dir_all(&dir)?;
        janitor.register(&dir);
        Ok(dir)
    }

    /// Write the profile's cookie secret to a fresh file. The path is registered for
    /// cleanup before anything is written to it.
    fn materialize_cookies(
        &self,
        profile: CookieProfile,
        dir: &Path,
        janitor: &ResourceJanitor,
    ) -> crate::Result<Option<PathBuf>> {
        let Some(secret) = self
            .settings
            .cookies
            .get(&profile)
            .filter(|secret| !secret.trim().is_empty())
        else {
            return Ok(None);
        };

        let file = tempfile::Builder::new()
            .prefix("cookies_")
            .suffix(".txt")
            .tempfile_in(dir)?;
        let (mut handle, path) = file.keep()?;
        janitor.register(&path);

        handle.write_all(secret.as_bytes())?;
        handle.flush()?;
        tracing::debug!("Using {} cookies from {}", profile.as_str(), path.display());

        Ok(Some(path))
    }

    /// Returns the path only if the image actually landed on disk
    async fn fetch_thumbnail(&self, url: &str, dir: &Path, janitor: &ResourceJanitor) -> Option<PathBuf> {
        let path = artifact_path(dir, "thumb", "jpg");
        janitor.register(&path);

        match self.thumbnails.download(url, &path).await {
            Ok(()) if path.exists() => Some(path),
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to download thumbnail: {:#}", e);
                None
            }
        }
    }

    async fn enrich(&self, audio_path: &Path, title: &str, thumbnail_path: Option<&Path>) {
        let cover = match thumbnail_path {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!("Could not read thumbnail {}: {}", path.display(), e);
                    None
                }
            },
            None => None,
        };

        let enricher = self.enricher.clone();
        let audio_path = audio_path.to_path_buf();
        let title = title.to_string();
        let author = self.settings.author.clone();
        let result = self
            .pool
            .run_blocking(move || enricher.tag(&audio_path, &title, &author, cover.as_deref()))
            .await;
        if let Err(e) = result {
            tracing::warn!("Tagging task did not run: {}", e);
        }
    }

    async fn inspect(&self, video_path: &Path, probe: &MediaProbe) -> VideoDimensions {
        let path = video_path.to_path_buf();
        match self.pool.run_blocking(move || ffprobe::inspect_video(&path)).await {
            Ok(Ok(dims)) => dims,
            Ok(Err(e)) | Err(e) => {
                tracing::debug!("Falling back to probed dimensions: {:#}", e);
                VideoDimensions::from_probe(probe)
            }
        }
    }

    /// Feed a transfer's samples into a throttled progress reporter while it runs
    async fn with_progress<F, Fut, T>(&self, message: Option<MessageRef>, phase: &str, transfer: F) -> T
    where
        F: FnOnce(mpsc::UnboundedSender<TransferSample>) -> Fut,
        Fut: Future<Output = T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = message.map(|message| {
            let reporter = ProgressReporter::new(
                ProgressTracker::new(phase, self.settings.footer.clone()),
                self.transport.clone(),
                message,
                self.settings.progress_interval,
            );
            tokio::spawn(reporter.run(rx))
        });

        let output = transfer(tx).await;

        if let Some(handle) = reporter {
            // every sender is gone once the transfer future has completed
            match handle.await {
                Ok(Some(last)) => tracing::debug!(
                    "{} ended at {} of {} bytes",
                    phase,
                    last.bytes_done,
                    last.bytes_total.map_or_else(|| "unknown".to_string(), |t| t.to_string())
                ),
                Ok(None) => tracing::debug!("{} reported no progress", phase),
                Err(e) => tracing::debug!("Progress reporter stopped: {}", e),
            }
        }
        output
    }

    fn caption(&self, title: &str) -> String {
        if self.settings.footer.is_empty() {
            format!("**{}**", title)
        } else {
            format!("**{}**\n\n**{}**", title, self.settings.footer)
        }
    }

    async fn edit_status(&self, ctx: &JobContext, text: &str) {
        if let Some(message) = &ctx.status_message {
            if let Err(e) = self.transport.edit_message(message, text).await {
                tracing::debug!("Status update dropped: {}", e);
            }
        }
    }

    /// Replace the progress message with `text`, or reply if there is none
    async fn notify_in_place(&self, ctx: &JobContext, text: &str) {
        match &ctx.status_message {
            Some(message) => {
                if self.transport.edit_message(message, text).await.is_err() {
                    self.say(ctx.request.chat_id, text).await;
                }
            }
            None => self.say(ctx.request.chat_id, text).await,
        }
    }

    async fn say(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.transport.reply(chat_id, text).await {
            tracing::warn!("Could not reply to chat {}: {}", chat_id, e);
        }
    }
}
