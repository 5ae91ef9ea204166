use serde::{Deserialize, Serialize};

use crate::extractors::MediaProbe;

/// Three hours
pub const DEFAULT_MAX_DURATION_SECONDS: u64 = 3 * 3600;

/// 2 GiB
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Ceilings checked before a payload download starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_duration_seconds: u64,
    pub max_size_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_duration_seconds: DEFAULT_MAX_DURATION_SECONDS,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    TooLong { duration_seconds: u64, max_seconds: u64 },
    TooLarge { size_bytes: u64, max_bytes: u64 },
}

impl PolicyViolation {
    pub fn user_message(&self) -> String {
        match self {
            PolicyViolation::TooLong { max_seconds, .. } => format!(
                "**Video too long (max {})!**",
                crate::utils::format_limit_duration(*max_seconds)
            ),
            PolicyViolation::TooLarge { max_bytes, .. } => format!(
                "**Video too large (max {})!**",
                crate::utils::format_file_size(*max_bytes)
            ),
        }
    }
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::TooLong { duration_seconds, max_seconds } => {
                write!(f, "duration {}s exceeds {}s", duration_seconds, max_seconds)
            }
            PolicyViolation::TooLarge { size_bytes, max_bytes } => {
                write!(f, "size {} bytes exceeds {} bytes", size_bytes, max_bytes)
            }
        }
    }
}

/// Outcome of [`check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyResult {
    Ok,
    Rejected(PolicyViolation),
}

impl PolicyResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, PolicyResult::Ok)
    }
}

/// Compare a probe against the limits. Duration is checked first; an unknown or zero
/// size always passes.
pub fn check(probe: &MediaProbe, limits: &Limits) -> PolicyResult {
    if let Some(duration) = probe.duration_seconds {
        if duration > limits.max_duration_seconds {
            return PolicyResult::Rejected(PolicyViolation::TooLong {
                duration_seconds: duration,
                max_seconds: limits.max_duration_seconds,
            });
        }
    }

    if let Some(size) = probe.largest_size().filter(|s| *s > 0) {
        if size > limits.max_size_bytes {
            return PolicyResult::Rejected(PolicyViolation::TooLarge {
                size_bytes: size,
                max_bytes: limits.max_size_bytes,
            });
        }
    }

    PolicyResult::Ok
}
