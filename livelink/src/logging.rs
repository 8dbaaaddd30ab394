//! Diagnostic tracing for livelink, written to stderr and filtered by
//! `RUST_LOG`. Nothing here is persisted; the CSV ledger (`io::ledger`) is
//! the audit record and is written regardless of the filter.
//!
//! What each level shows:
//!
//! - `warn` (default): retried transient failures, failed items, aborted runs,
//!   skipped duplicate ledger rows.
//! - `info`: pairing totals and the per-run success/failure counts.
//! - `debug`: run phase transitions, every listing page fetched, the
//!   connectivity check, ledger files created and read.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for diagnostic logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=livelink=debug livelink link --dry-run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
