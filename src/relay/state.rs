use serde::Serialize;

/// Lifecycle of one relay job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Admitted,
    ProbingMetadata,
    PolicyChecked,
    Downloading,
    /// Audio only
    Enriching,
    Uploading,
    Completed,
    Failed,
    Rejected,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Rejected)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        matches!(
            (self, next),
            (Admitted, ProbingMetadata)
                | (ProbingMetadata, PolicyChecked)
                | (ProbingMetadata, Downloading)
                | (PolicyChecked, Downloading)
                | (PolicyChecked, Rejected)
                | (Downloading, Enriching)
                | (Downloading, Uploading)
                | (Enriching, Uploading)
                | (Uploading, Completed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::JobState::*;

    #[test]
    fn test_happy_paths() {
        assert!(Admitted.can_transition_to(ProbingMetadata));
        assert!(ProbingMetadata.can_transition_to(Downloading));
        assert!(PolicyChecked.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Enriching));
        assert!(Enriching.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Completed));
    }

    #[test]
    fn test_rejection_only_after_policy_check() {
        assert!(PolicyChecked.can_transition_to(Rejected));
        assert!(!ProbingMetadata.can_transition_to(Rejected));
        assert!(!Downloading.can_transition_to(Rejected));
    }

    #[test]
    fn test_failed_is_reachable_and_absorbing() {
        for state in [Admitted, ProbingMetadata, PolicyChecked, Downloading, Enriching, Uploading] {
            assert!(state.can_transition_to(Failed), "{state} -> Failed");
        }
        assert!(!Failed.can_transition_to(Admitted));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Rejected.can_transition_to(Downloading));
    }
}
