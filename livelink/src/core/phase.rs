//! Run phase state machine shared by the link and unlink flows.

use thiserror::Error;

/// Phase of a single link or unlink run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Discovering,
    AwaitingConfirmation,
    Executing,
    Summarizing,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal run phase transition {from:?} -> {to:?}")]
pub struct PhaseError {
    pub from: RunPhase,
    pub to: RunPhase,
}

impl RunPhase {
    /// Move to `next`, rejecting transitions the run protocol does not allow.
    ///
    /// `Discovering -> Summarizing` is the dry-run (and nothing-to-do)
    /// shortcut; `Aborted` is reachable from discovery, confirmation and
    /// execution.
    pub fn advance(self, next: RunPhase) -> Result<RunPhase, PhaseError> {
        use RunPhase::{
            Aborted, AwaitingConfirmation, Discovering, Done, Executing, Idle, Summarizing,
        };

        let allowed = matches!(
            (self, next),
            (Idle, Discovering)
                | (Idle, Aborted)
                | (Discovering, AwaitingConfirmation)
                | (Discovering, Summarizing)
                | (Discovering, Aborted)
                | (AwaitingConfirmation, Executing)
                | (AwaitingConfirmation, Aborted)
                | (Executing, Summarizing)
                | (Executing, Aborted)
                | (Summarizing, Done)
        );
        if allowed {
            Ok(next)
        } else {
            Err(PhaseError {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_run_path_is_allowed() {
        let phase = RunPhase::Idle
            .advance(RunPhase::Discovering)
            .and_then(|p| p.advance(RunPhase::AwaitingConfirmation))
            .and_then(|p| p.advance(RunPhase::Executing))
            .and_then(|p| p.advance(RunPhase::Summarizing))
            .and_then(|p| p.advance(RunPhase::Done))
            .expect("valid path");
        assert_eq!(phase, RunPhase::Done);
    }

    #[test]
    fn dry_run_skips_confirmation() {
        let phase = RunPhase::Discovering
            .advance(RunPhase::Summarizing)
            .expect("dry-run shortcut");
        assert_eq!(phase, RunPhase::Summarizing);
    }

    #[test]
    fn cannot_execute_without_confirmation() {
        let err = RunPhase::Discovering
            .advance(RunPhase::Executing)
            .expect_err("must confirm first");
        assert_eq!(err.from, RunPhase::Discovering);
        assert_eq!(err.to, RunPhase::Executing);
    }

    #[test]
    fn terminal_phases_do_not_move() {
        assert!(RunPhase::Done.advance(RunPhase::Discovering).is_err());
        assert!(RunPhase::Aborted.advance(RunPhase::Summarizing).is_err());
        assert!(RunPhase::Summarizing.advance(RunPhase::Aborted).is_err());
    }
}
