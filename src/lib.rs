//! Media Relay - fetch audio/video from media URLs and re-upload it to a chat
//!
//! This library provides the single-flight job core of the relay: a per-user job gate,
//! duration/size policy checks, progress rendering, temporary-file cleanup and the
//! orchestrator that drives probe, download, tagging and upload through pluggable
//! extractor and transport collaborators.

pub mod bot;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod extractors;
pub mod gate;
pub mod janitor;
pub mod policy;
pub mod progress;
pub mod relay;
pub mod transport;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{CookieProfile, Extractor, MediaKind, MediaProbe};
pub use gate::{JobGate, JobRegistry};
pub use relay::{FetchOrchestrator, JobOutcome, JobRequest};
pub use transport::Transport;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// User-visible job failures
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("a job is already running for user {0}")]
    AlreadyRunning(u64),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(policy::PolicyViolation),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Download failed")]
    DownloadFailed,

    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

impl RelayError {
    /// Text shown to the user in the chat
    pub fn user_message(&self) -> String {
        match self {
            RelayError::AlreadyRunning(_) => "**You already have an ongoing download!**".to_string(),
            RelayError::PolicyViolation(violation) => violation.user_message(),
            RelayError::DownloadFailed => "**Download failed!**".to_string(),
            RelayError::ProbeFailed(cause)
            | RelayError::FetchFailed(cause)
            | RelayError::UploadFailed(cause) => format!("**Error:** {}", cause),
        }
    }
}
