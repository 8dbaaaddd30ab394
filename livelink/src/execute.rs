//! Pieces shared by the link and unlink flows: phase tracking, the single
//! retry policy and the per-item execution loop.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::phase::RunPhase;
use crate::core::types::{LedgerRecord, Outcome};
use crate::exit_codes;
use crate::io::api::ApiError;
use crate::io::confirm::Confirm;
use crate::io::ledger::LedgerWriter;

/// Final state of a link or unlink run that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// `Done`, or `Aborted` when the user declined.
    pub phase: RunPhase,
    /// Items eligible for execution (candidate pairs or ledger rows).
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ledger rows ignored because they do not describe an executed link.
    pub skipped: usize,
    /// Ledger written by this run, if any.
    pub ledger_path: Option<PathBuf>,
}

impl RunReport {
    pub fn new(candidates: usize) -> Self {
        Self {
            phase: RunPhase::Idle,
            candidates,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            ledger_path: None,
        }
    }

    pub fn declined(&self) -> bool {
        self.phase == RunPhase::Aborted
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        if self.declined() {
            exit_codes::CANCELLED
        } else if self.failed > 0 {
            exit_codes::PARTIAL
        } else {
            exit_codes::OK
        }
    }
}

/// Walks a [`RunPhase`] machine and logs every transition.
#[derive(Debug)]
pub struct PhaseTracker {
    flow: &'static str,
    phase: RunPhase,
}

impl PhaseTracker {
    pub fn new(flow: &'static str) -> Self {
        Self {
            flow,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn enter(&mut self, next: RunPhase) -> Result<()> {
        self.phase = self.phase.advance(next)?;
        debug!(flow = self.flow, phase = ?next, "phase");
        Ok(())
    }

    /// Move to `Aborted` (when legal) and hand back `err` for propagation.
    pub fn abort(&mut self, err: anyhow::Error) -> anyhow::Error {
        match self.phase.advance(RunPhase::Aborted) {
            Ok(phase) => {
                self.phase = phase;
                warn!(flow = self.flow, error = %format!("{err:#}"), "run aborted");
            }
            Err(phase_err) => warn!(flow = self.flow, %phase_err, "abort from unexpected phase"),
        }
        err
    }
}

/// Ask for the explicit go-ahead before `count` mutations.
pub fn confirm_execution<C: Confirm + ?Sized>(
    confirm: &mut C,
    verb: &str,
    count: usize,
) -> Result<bool> {
    let plural = if count > 1 { "s" } else { "" };
    confirm.confirm(&format!("Would you like to {verb} the {count} asset{plural}?"))
}

/// Run `op`, retrying once after `backoff` when the failure is transient.
pub fn with_retry<T, F>(backoff: Duration, what: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Result<T, ApiError>,
{
    match op() {
        Err(err) if err.is_transient() => {
            warn!(what, error = %err, backoff_ms = backoff.as_millis() as u64, "transient failure, retrying once");
            thread::sleep(backoff);
            op()
        }
        other => other,
    }
}

/// Counts from [`execute_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
}

/// Apply `mutate` to every planned row, in order, recording each attempt.
///
/// Each row is written to `ledger` right after its mutation returns and before
/// the next one starts. Per-item failures become `failed` rows and the loop
/// continues; an authentication failure is recorded and then ends the run
/// with an error, as do ledger write failures.
pub fn execute_all<F>(
    planned: &[LedgerRecord],
    ledger: &mut LedgerWriter,
    backoff: Duration,
    success: Outcome,
    verb: &str,
    mut mutate: F,
) -> Result<Tally>
where
    F: FnMut(&LedgerRecord) -> Result<(), ApiError>,
{
    let total = planned.len();
    let mut tally = Tally::default();

    for (idx, row) in planned.iter().enumerate() {
        println!(
            "{verb} asset {}/{total}: {} <-> {}",
            idx + 1,
            row.photo_filename,
            row.video_filename
        );
        let what = format!("{verb} {}", row.photo_asset_id);
        let result = with_retry(backoff, &what, || mutate(row));

        let mut done = row.clone();
        done.operated_at = Utc::now();
        done.outcome = success;
        done.error = None;

        let fatal = match result {
            Ok(()) => {
                tally.succeeded += 1;
                None
            }
            Err(err) => {
                warn!(photo = %row.photo_asset_id, video = %row.video_asset_id, error = %err, "item failed");
                tally.failed += 1;
                done = done.with_error(err.to_string());
                err.is_auth().then_some(err)
            }
        };

        ledger
            .append(&done)
            .with_context(|| format!("record {what} in ledger"))?;

        if let Some(err) = fatal {
            return Err(anyhow::Error::new(err)
                .context(format!("stopping after item {}/{total}", idx + 1)));
        }
    }

    info!(verb, succeeded = tally.succeeded, failed = tally.failed, "execution finished");
    Ok(tally)
}
