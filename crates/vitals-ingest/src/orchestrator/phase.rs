//! Run state machine

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Upload copied to the staging area
    Staged,
    Streaming,
    /// A full batch is being written and committed
    Committing,
    /// Document fully read, final batch pending
    Finalized,
    Succeeded,
    DocumentRejected,
    CommitFailed,
    TimedOut,
    /// Staged file removed; nothing follows
    Cleanup,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Staged => "staged",
            RunPhase::Streaming => "streaming",
            RunPhase::Committing => "committing",
            RunPhase::Finalized => "finalized",
            RunPhase::Succeeded => "succeeded",
            RunPhase::DocumentRejected => "document_rejected",
            RunPhase::CommitFailed => "commit_failed",
            RunPhase::TimedOut => "timed_out",
            RunPhase::Cleanup => "cleanup",
        }
    }

    /// Success or one of the failure outcomes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Succeeded
                | RunPhase::DocumentRejected
                | RunPhase::CommitFailed
                | RunPhase::TimedOut
        )
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;

        match (self, next) {
            // Staging itself can fail before any streaming starts
            (Staged, Streaming | DocumentRejected) => true,
            (Streaming, Committing | Finalized | DocumentRejected | CommitFailed) => true,
            (Committing, Streaming | CommitFailed) => true,
            (Finalized, Succeeded | CommitFailed) => true,
            (Staged | Streaming | Committing | Finalized, TimedOut) => true,
            (from, Cleanup) => from.is_terminal(),
            _ => false,
        }
    }

    /// Terminal phase a failed run ends in
    pub fn for_failure(error: &IngestError) -> RunPhase {
        match error {
            IngestError::CommitFailure { .. } => RunPhase::CommitFailed,
            IngestError::Timeout(_) => RunPhase::TimedOut,
            IngestError::BadRequest(_)
            | IngestError::MalformedDocument { .. }
            | IngestError::Io(_) => RunPhase::DocumentRejected,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase of one run, logging every move
#[derive(Debug)]
pub struct PhaseTracker {
    run_id: Uuid,
    current: RunPhase,
}

impl PhaseTracker {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            current: RunPhase::Staged,
        }
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    /// Move to `next`; invalid moves are logged and ignored
    pub fn advance(&mut self, next: RunPhase) -> bool {
        if !self.current.can_transition_to(next) {
            warn!(
                run_id = %self.run_id,
                from = %self.current,
                to = %next,
                "Ignoring invalid phase transition"
            );
            return false;
        }
        debug!(run_id = %self.run_id, from = %self.current, to = %next, "Phase transition");
        self.current = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_happy_path() {
        let mut tracker = PhaseTracker::new(Uuid::new_v4());
        for next in [
            RunPhase::Streaming,
            RunPhase::Committing,
            RunPhase::Streaming,
            RunPhase::Finalized,
            RunPhase::Succeeded,
            RunPhase::Cleanup,
        ] {
            assert!(tracker.advance(next), "rejected move to {next}");
        }
        assert_eq!(tracker.current(), RunPhase::Cleanup);
    }

    #[test]
    fn test_invalid_move_keeps_phase() {
        let mut tracker = PhaseTracker::new(Uuid::new_v4());
        assert!(!tracker.advance(RunPhase::Succeeded));
        assert!(!tracker.advance(RunPhase::Cleanup));
        assert_eq!(tracker.current(), RunPhase::Staged);
    }

    #[test]
    fn test_every_terminal_reaches_cleanup() {
        for phase in [
            RunPhase::Succeeded,
            RunPhase::DocumentRejected,
            RunPhase::CommitFailed,
            RunPhase::TimedOut,
        ] {
            assert!(phase.is_terminal());
            assert!(phase.can_transition_to(RunPhase::Cleanup));
            assert!(!phase.can_transition_to(RunPhase::Streaming));
        }
        assert!(!RunPhase::Cleanup.can_transition_to(RunPhase::Cleanup));
    }

    #[test]
    fn test_timeout_from_any_working_phase() {
        for phase in [
            RunPhase::Staged,
            RunPhase::Streaming,
            RunPhase::Committing,
            RunPhase::Finalized,
        ] {
            assert!(phase.can_transition_to(RunPhase::TimedOut));
        }
    }

    #[test]
    fn test_staging_failure_is_rejected() {
        let mut tracker = PhaseTracker::new(Uuid::new_v4());
        assert!(tracker.advance(RunPhase::for_failure(&IngestError::Io(
            std::io::Error::other("disk full")
        ))));
        assert!(tracker.advance(RunPhase::Cleanup));
        assert!(!RunPhase::Staged.can_transition_to(RunPhase::CommitFailed));
    }

    #[test]
    fn test_failure_phase_mapping() {
        assert_eq!(
            RunPhase::for_failure(&IngestError::malformed(3, "bad")),
            RunPhase::DocumentRejected
        );
        assert_eq!(
            RunPhase::for_failure(&IngestError::Timeout(Duration::from_secs(1))),
            RunPhase::TimedOut
        );
    }
}
