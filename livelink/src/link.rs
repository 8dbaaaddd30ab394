//! Orchestration for `livelink link`: discover, confirm, link, record.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::pairing::{Pairing, pair_assets};
use crate::core::phase::RunPhase;
use crate::core::types::{Asset, CandidatePair, LedgerRecord, MediaKind, Outcome, RunMode};
use crate::execute::{PhaseTracker, RunReport, confirm_execution, execute_all, with_retry};
use crate::io::api::{ApiError, AssetApi, AssetQuery};
use crate::io::config::Settings;
use crate::io::confirm::Confirm;
use crate::io::ledger::{LedgerKind, LedgerWriter, ledger_file_name};
use crate::io::listing::AssetListing;

/// Find unlinked photo/video pairs and, unless in dry-run mode, link them
/// after confirmation.
///
/// Returns `Err` for fatal conditions (credentials, connectivity, unwritable
/// ledger); per-item failures are counted in the report instead.
pub fn run_link<A, C>(
    api: &A,
    confirm: &mut C,
    settings: &Settings,
    mode: RunMode,
) -> Result<RunReport>
where
    A: AssetApi + ?Sized,
    C: Confirm + ?Sized,
{
    let mut tracker = PhaseTracker::new("link");
    tracker.enter(RunPhase::Discovering)?;

    with_retry(settings.retry_backoff, "connect", || api.check_connection())
        .context("connect to server")
        .map_err(|err| tracker.abort(err))?;

    println!("1/2: Identifying unlinked Live Photo assets...");
    let pairing = discover(api, settings).map_err(|err| tracker.abort(err))?;
    let mut pairs = pairing.pairs;
    let mut report = RunReport::new(pairs.len());

    println!("Identified {} unlinked Live Photos.", pairs.len());
    if !pairing.unmatched_photos.is_empty() {
        println!(
            "{} unlinked photos have no companion video within the match window.",
            pairing.unmatched_photos.len()
        );
    }
    if pairs.is_empty() {
        tracker.enter(RunPhase::Summarizing)?;
        tracker.enter(RunPhase::Done)?;
        report.phase = tracker.phase();
        return Ok(report);
    }
    print_example(api, &pairs[0]);

    if mode == RunMode::DryRun {
        tracker.enter(RunPhase::Summarizing)?;
        if confirm.confirm("Would you like to save a record of the assets?")? {
            let path = save_planned(&pairs, settings)?;
            println!("Record of identified Live Photo/Video assets saved to: {}", path.display());
            report.ledger_path = Some(path);
        }
        println!("Dry run of Live Photo linking completed.");
        tracker.enter(RunPhase::Done)?;
        report.phase = tracker.phase();
        return Ok(report);
    }

    if mode == RunMode::TestRun {
        println!("\n============= TEST RUN ACTIVE ============\n");
        println!("Processing only the first asset as a test.");
        println!("==========================================\n");
        pairs.truncate(1);
        report.candidates = 1;
    }

    tracker.enter(RunPhase::AwaitingConfirmation)?;
    if !confirm_execution(confirm, "link", pairs.len())? {
        println!("Live Photo linking cancelled.");
        tracker.enter(RunPhase::Aborted)?;
        report.phase = tracker.phase();
        return Ok(report);
    }

    tracker.enter(RunPhase::Executing)?;
    println!("\n2/2: Linking Live Photos and Live Video assets...");
    let kind = if mode == RunMode::TestRun {
        LedgerKind::TestRun
    } else {
        LedgerKind::Linked
    };
    let path = settings.output_dir.join(ledger_file_name(kind, Utc::now()));
    let mut ledger = LedgerWriter::create(&path)
        .context("open ledger before linking")
        .map_err(|err| tracker.abort(err))?;
    report.ledger_path = Some(path);

    let planned = planned_rows(&pairs);
    let tally = execute_all(
        &planned,
        &mut ledger,
        settings.retry_backoff,
        Outcome::Linked,
        "Linking",
        |row| api.link(&row.photo_asset_id, &row.video_asset_id),
    )
    .map_err(|err| tracker.abort(err))?;
    report.succeeded = tally.succeeded;
    report.failed = tally.failed;

    tracker.enter(RunPhase::Summarizing)?;
    println!("\nUpdate Summary:");
    println!("Successfully linked {} files.", report.succeeded);
    if report.failed > 0 {
        println!("Failed to link {} files.", report.failed);
    }
    println!(
        "Ledger of linked assets ({} rows): {}",
        ledger.rows(),
        ledger.path().display()
    );
    tracker.enter(RunPhase::Done)?;
    report.phase = tracker.phase();
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "Live Photo linking complete"
    );
    Ok(report)
}

/// List images and videos and pair them.
///
/// Linked images are listed too: the videos they reference must not be
/// offered to another photo. A transient failure restarts that listing once.
pub fn discover<A: AssetApi + ?Sized>(api: &A, settings: &Settings) -> Result<Pairing> {
    println!("  Fetching video assets...");
    let mut assets = collect_listing(api, AssetQuery::all(MediaKind::Video), settings)?;
    if assets.is_empty() {
        println!("No video assets identified.");
        return Ok(Pairing::default());
    }
    println!("  Fetching image assets...");
    assets.extend(collect_listing(api, AssetQuery::all(MediaKind::Image), settings)?);

    let pairing = pair_assets(&assets, settings.match_tolerance);
    info!(
        assets = assets.len(),
        pairs = pairing.pairs.len(),
        unmatched_photos = pairing.unmatched_photos.len(),
        unmatched_videos = pairing.unmatched_videos.len(),
        "pairing complete"
    );
    Ok(pairing)
}

fn collect_listing<A: AssetApi + ?Sized>(
    api: &A,
    query: AssetQuery,
    settings: &Settings,
) -> Result<Vec<Asset>> {
    let listing = AssetListing::new(api, query);
    let assets = with_retry(settings.retry_backoff, "list assets", || {
        listing.iter().collect::<Result<Vec<_>, ApiError>>()
    })
    .with_context(|| format!("list {:?} assets", query.kind))?;
    debug!(kind = ?query.kind, count = assets.len(), "listing collected");
    Ok(assets)
}

fn planned_rows(pairs: &[CandidatePair]) -> Vec<LedgerRecord> {
    let now = Utc::now();
    pairs
        .iter()
        .map(|pair| LedgerRecord::for_pair(pair, Outcome::Planned, now))
        .collect()
}

fn save_planned(pairs: &[CandidatePair], settings: &Settings) -> Result<std::path::PathBuf> {
    let path = settings
        .output_dir
        .join(ledger_file_name(LedgerKind::DryRun, Utc::now()));
    let mut ledger = LedgerWriter::create(&path)?;
    for row in planned_rows(pairs) {
        ledger.append(&row)?;
    }
    Ok(path)
}

/// Print the first pair as the server currently reports it.
fn print_example<A: AssetApi + ?Sized>(api: &A, pair: &CandidatePair) {
    let fetched = api
        .get_asset(&pair.photo_asset_id)
        .and_then(|photo| api.get_asset(&pair.video_asset_id).map(|video| (photo, video)));
    let (photo_name, photo_date, video_name, video_date) = match fetched {
        Ok((photo, video)) => (
            photo.original_file_name,
            photo.file_created_at,
            video.original_file_name,
            video.file_created_at,
        ),
        Err(err) => {
            warn!(error = %err, "could not fetch example assets, using listing data");
            (
                pair.photo_filename.clone(),
                pair.photo_created_at,
                pair.video_filename.clone(),
                pair.video_created_at,
            )
        }
    };
    println!("Example Unlinked Live Photo/Video File Information:");
    println!("    - Live Photo Original Filename: {photo_name}");
    println!("    - Live Photo Creation Date: {}", photo_date.to_rfc3339());
    println!("    - Live Video Original Filename: {video_name}");
    println!("    - Live Video Creation Date: {}", video_date.to_rfc3339());
}
