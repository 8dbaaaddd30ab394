//! Orchestration for `livelink unlink`: reverse the links recorded in a ledger.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::core::phase::RunPhase;
use crate::core::types::{LedgerRecord, Outcome, RunMode};
use crate::execute::{PhaseTracker, RunReport, confirm_execution, execute_all, with_retry};
use crate::io::api::AssetApi;
use crate::io::config::Settings;
use crate::io::confirm::Confirm;
use crate::io::ledger::{LedgerKind, LedgerWriter, ledger_file_name, read_ledger};

/// Clear the live-photo link of every photo the ledger records as `linked`.
///
/// A photo now linked to a different video than the row records is left alone
/// and counted as failed. Rows with any other outcome, and repeated photo ids,
/// are skipped. Test-run mode is not offered for reversal; `mode` is either
/// dry-run or full-run.
pub fn run_unlink<A, C>(
    api: &A,
    confirm: &mut C,
    settings: &Settings,
    ledger_path: &Path,
    mode: RunMode,
) -> Result<RunReport>
where
    A: AssetApi + ?Sized,
    C: Confirm + ?Sized,
{
    let mut tracker = PhaseTracker::new("unlink");
    tracker.enter(RunPhase::Discovering)?;

    with_retry(settings.retry_backoff, "connect", || api.check_connection())
        .context("connect to server")
        .map_err(|err| tracker.abort(err))?;

    println!("1/2: Reading linked assets from {}...", ledger_path.display());
    let rows = read_ledger(ledger_path)
        .context("read ledger for reversal")
        .map_err(|err| tracker.abort(err))?;
    let total_rows = rows.len();
    let planned = reversible_rows(rows);
    let mut report = RunReport::new(planned.len());
    report.skipped = total_rows - planned.len();

    println!(
        "Identified {} linked Live Photos to unlink ({} rows skipped).",
        planned.len(),
        report.skipped
    );
    if planned.is_empty() {
        tracker.enter(RunPhase::Summarizing)?;
        tracker.enter(RunPhase::Done)?;
        report.phase = tracker.phase();
        return Ok(report);
    }
    let example = &planned[0];
    println!("Example Linked Live Photo/Video:");
    println!("    - Live Photo: {} ({})", example.photo_filename, example.photo_asset_id);
    println!("    - Live Video: {} ({})", example.video_filename, example.video_asset_id);

    if mode == RunMode::DryRun {
        tracker.enter(RunPhase::Summarizing)?;
        println!("Dry run of Live Photo unlinking completed.");
        tracker.enter(RunPhase::Done)?;
        report.phase = tracker.phase();
        return Ok(report);
    }

    tracker.enter(RunPhase::AwaitingConfirmation)?;
    if !confirm_execution(confirm, "unlink", planned.len())? {
        println!("Live Photo unlinking cancelled.");
        tracker.enter(RunPhase::Aborted)?;
        report.phase = tracker.phase();
        return Ok(report);
    }

    tracker.enter(RunPhase::Executing)?;
    println!("\n2/2: Unlinking Live Photos and Live Video assets...");
    let path = settings
        .output_dir
        .join(ledger_file_name(LedgerKind::Unlinked, Utc::now()));
    let mut ledger = LedgerWriter::create(&path)
        .context("open ledger before unlinking")
        .map_err(|err| tracker.abort(err))?;
    report.ledger_path = Some(path);

    let tally = execute_all(
        &planned,
        &mut ledger,
        settings.retry_backoff,
        Outcome::Unlinked,
        "Unlinking",
        |row| api.unlink(&row.photo_asset_id, &row.video_asset_id),
    )
    .map_err(|err| tracker.abort(err))?;
    report.succeeded = tally.succeeded;
    report.failed = tally.failed;

    tracker.enter(RunPhase::Summarizing)?;
    println!("\nUpdate Summary:");
    println!("Successfully unlinked {} files.", report.succeeded);
    if report.failed > 0 {
        println!("Failed to unlink {} files.", report.failed);
    }
    println!(
        "Ledger of unlinked assets ({} rows): {}",
        ledger.rows(),
        ledger.path().display()
    );
    tracker.enter(RunPhase::Done)?;
    report.phase = tracker.phase();
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "Live Photo unlinking complete"
    );
    Ok(report)
}

/// Keep rows describing a successful link, first occurrence per photo.
fn reversible_rows(rows: Vec<LedgerRecord>) -> Vec<LedgerRecord> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            if row.outcome != Outcome::Linked {
                return false;
            }
            if !seen.insert(row.photo_asset_id.clone()) {
                warn!(photo = %row.photo_asset_id, "duplicate ledger row skipped");
                return false;
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ledger::read_ledger;
    use crate::test_support::{FakeApi, ScriptedConfirm, TestWorkspace, linked_photo, record, video};

    #[test]
    fn only_linked_rows_are_reversible() {
        let rows = vec![
            record("p1", "v1", Outcome::Linked),
            record("p2", "v2", Outcome::Failed),
            record("p3", "v3", Outcome::Planned),
            record("p1", "v1", Outcome::Linked),
        ];
        let kept = reversible_rows(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].photo_asset_id, "p1");
    }

    #[test]
    fn missing_link_is_a_per_item_failure() {
        let ws = TestWorkspace::new();
        let api = FakeApi::new(vec![
            linked_photo("p1", "A.heic", "2023-05-01T10:00:00Z", "v1"),
            video("v1", "A.mov", "2023-05-01T10:00:00Z"),
        ]);
        let csv = ws.write_ledger(&[
            record("p0", "v0", Outcome::Linked),
            record("p1", "v1", Outcome::Linked),
        ]);
        let mut confirm = ScriptedConfirm::new([true]);

        let report =
            run_unlink(&api, &mut confirm, ws.settings(), &csv, RunMode::FullRun).expect("run");

        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(api.live_video_of("p1"), None);
        let rows = read_ledger(&report.ledger_path.expect("ledger")).expect("read");
        assert_eq!(rows[0].outcome, Outcome::Failed);
        assert_eq!(rows[1].outcome, Outcome::Unlinked);
    }

    #[test]
    fn newer_link_to_another_video_is_preserved() {
        let ws = TestWorkspace::new();
        let api = FakeApi::new(vec![
            linked_photo("p1", "A.heic", "2023-05-01T10:00:00Z", "v9"),
            video("v1", "A.mov", "2023-05-01T10:00:00Z"),
            video("v9", "A_2.mov", "2023-05-01T10:00:01Z"),
        ]);
        let csv = ws.write_ledger(&[record("p1", "v1", Outcome::Linked)]);
        let mut confirm = ScriptedConfirm::new([true]);

        let report =
            run_unlink(&api, &mut confirm, ws.settings(), &csv, RunMode::FullRun).expect("run");

        assert_eq!((report.succeeded, report.failed), (0, 1));
        assert_eq!(api.live_video_of("p1").as_deref(), Some("v9"));
        let rows = read_ledger(&report.ledger_path.expect("ledger")).expect("read");
        assert_eq!(rows[0].outcome, Outcome::Failed);
        assert!(rows[0].error.as_deref().is_some_and(|e| e.contains("v9")));
    }

    #[test]
    fn malformed_ledger_aborts_without_mutation() {
        let ws = TestWorkspace::new();
        let csv = ws.path().join("broken.csv");
        std::fs::write(&csv, "photo_asset_id,video_asset_id\np1,v1\n").expect("write");
        let api = FakeApi::new(Vec::new());
        let mut confirm = ScriptedConfirm::new([true]);

        let err = run_unlink(&api, &mut confirm, ws.settings(), &csv, RunMode::FullRun)
            .expect_err("format error");

        assert!(format!("{err:#}").contains("line 1"));
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn dry_run_reports_without_mutation() {
        let ws = TestWorkspace::new();
        let api = FakeApi::new(vec![linked_photo(
            "p1",
            "A.heic",
            "2023-05-01T10:00:00Z",
            "v1",
        )]);
        let csv = ws.write_ledger(&[record("p1", "v1", Outcome::Linked)]);
        let mut confirm = ScriptedConfirm::unprompted();

        let report =
            run_unlink(&api, &mut confirm, ws.settings(), &csv, RunMode::DryRun).expect("run");

        assert_eq!(report.phase, RunPhase::Done);
        assert_eq!(report.candidates, 1);
        assert_eq!(api.mutation_count(), 0);
        assert_eq!(api.live_video_of("p1").as_deref(), Some("v1"));
    }
}
