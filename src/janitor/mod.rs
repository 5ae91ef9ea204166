//! Cleanup obligations for the temporary files a job creates.
//!
//! Every path handed to [`ResourceJanitor::register`] is deleted by
//! [`ResourceJanitor::release_all`], which also runs when the janitor is dropped, so
//! an early return, an error or a panic inside a job still removes its files.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ResourceJanitor {
    paths: Mutex<Vec<PathBuf>>,
}

impl ResourceJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to the cleanup set. The file does not need to exist yet; a directory
    /// is removed with everything in it.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.lock();
        if !paths.contains(&path) {
            tracing::trace!("Registered for cleanup: {}", path.display());
            paths.push(path);
        }
    }

    /// Paths currently owned by the job
    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Delete every registered path that exists and clear the set.
    ///
    /// Returns the number of files actually removed.
    pub fn release_all(&self) -> usize {
        let paths = std::mem::take(&mut *self.lock());
        paths.iter().filter(|path| remove_quietly(path)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        // A poisoned set is still a valid list of paths
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn remove_quietly(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let removed = if path.is_dir() {
        fs_err::remove_dir_all(path)
    } else {
        fs_err::remove_file(path)
    };
    match removed {
        Ok(()) => {
            tracing::debug!("Removed temporary file {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Cleanup failed: {}", e);
            false
        }
    }
}
