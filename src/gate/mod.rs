//! Single-flight admission: one active job per user.
//!
//! [`JobRegistry`] is the only state shared between concurrent jobs. Every access is
//! one short critical section on a single mutex, so check-and-insert is atomic.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::extractors::{CookieProfile, MediaKind};
use crate::janitor::ResourceJanitor;
use crate::relay::JobState;
use crate::transport::{ChatId, UserId};

/// An admitted job as seen by the registry
#[derive(Debug, Clone)]
pub struct Job {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub media_kind: MediaKind,
    pub source_url: String,
    pub cookie_profile: CookieProfile,
    pub created_at: DateTime<Utc>,
    pub status: JobState,
    /// Cleanup set of the job, released by the shutdown hook if the job never finishes
    pub janitor: Arc<ResourceJanitor>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<UserId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert the job unless its user already has one
    pub fn insert_if_absent(&self, job: Job) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.user_id) {
            return false;
        }
        jobs.insert(job.user_id, job);
        true
    }

    pub fn remove(&self, user_id: UserId) -> Option<Job> {
        self.lock().remove(&user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.lock().contains_key(&user_id)
    }

    pub fn status(&self, user_id: UserId) -> Option<JobState> {
        self.lock().get(&user_id).map(|job| job.status)
    }

    pub fn set_status(&self, user_id: UserId, status: JobState) {
        if let Some(job) = self.lock().get_mut(&user_id) {
            job.status = status;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every active job and delete its temporary files. Used on shutdown.
    pub fn abandon_all(&self) -> usize {
        let jobs: Vec<Job> = self.lock().drain().map(|(_, job)| job).collect();
        for job in &jobs {
            let removed = job.janitor.release_all();
            tracing::info!(
                "Abandoned {} job for user {} ({} files removed)",
                job.media_kind,
                job.user_id,
                removed
            );
        }
        jobs.len()
    }
}

/// Admission front of the registry
#[derive(Debug, Clone, Default)]
pub struct JobGate {
    registry: Arc<JobRegistry>,
}

impl JobGate {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Returns false if the user already has an active job
    pub fn admit(&self, job: Job) -> bool {
        self.registry.insert_if_absent(job)
    }

    /// Idempotent
    pub fn release(&self, user_id: UserId) {
        if self.registry.remove(user_id).is_some() {
            tracing::debug!("Released job slot for user {}", user_id);
        }
    }

    /// Scoped admission: the slot is released when the returned guard drops
    pub fn try_acquire(&self, job: Job) -> Option<JobSlot> {
        let user_id = job.user_id;
        self.admit(job).then(|| JobSlot {
            gate: self.clone(),
            user_id,
        })
    }
}

/// Held for the lifetime of one job
#[derive(Debug)]
pub struct JobSlot {
    gate: JobGate,
    user_id: UserId,
}

impl JobSlot {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn set_status(&self, status: JobState) {
        self.gate.registry.set_status(self.user_id, status);
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        self.gate.release(self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(user_id: UserId) -> Job {
        Job {
            user_id,
            chat_id: user_id as ChatId,
            media_kind: MediaKind::Video,
            source_url: "https://example.com/v".into(),
            cookie_profile: CookieProfile::None,
            created_at: Utc::now(),
            status: JobState::Admitted,
            janitor: Arc::new(ResourceJanitor::new()),
        }
    }

    #[test]
    fn test_second_admission_rejected_until_release() {
        let gate = JobGate::default();
        assert!(gate.admit(job(1)));
        assert!(!gate.admit(job(1)));
        assert!(gate.admit(job(2)));

        gate.release(1);
        gate.release(1);
        assert!(gate.admit(job(1)));
        assert_eq!(gate.registry().len(), 2);
    }

    #[test]
    fn test_slot_releases_on_drop() {
        let gate = JobGate::default();
        {
            let slot = gate.try_acquire(job(5)).unwrap();
            slot.set_status(JobState::Downloading);
            assert_eq!(gate.registry().status(5), Some(JobState::Downloading));
            assert!(gate.try_acquire(job(5)).is_none());
        }
        assert!(!gate.registry().contains(5));
        assert!(gate.try_acquire(job(5)).is_some());
    }

    #[test]
    fn test_concurrent_admission_for_same_user() {
        let gate = JobGate::default();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.admit(job(9)))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_abandon_all_cleans_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_x.mp4");
        std::fs::write(&path, b"partial").unwrap();

        let registry = Arc::new(JobRegistry::new());
        let gate = JobGate::new(registry.clone());
        let active = job(3);
        active.janitor.register(&path);
        assert!(gate.admit(active));

        assert_eq!(registry.abandon_all(), 1);
        assert!(registry.is_empty());
        assert!(!path.exists());
    }
}
