//! Stable exit codes for livelink CLI commands.

/// Run completed and every executed item succeeded (or nothing to do).
pub const OK: i32 = 0;
/// Fatal error: bad config or credentials, unreachable server, unreadable or
/// unwritable ledger.
pub const FATAL: i32 = 1;
/// Run completed but at least one item failed; see the ledger.
pub const PARTIAL: i32 = 2;
/// The user declined the confirmation prompt.
pub const CANCELLED: i32 = 3;
