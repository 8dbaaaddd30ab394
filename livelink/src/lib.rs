//! Live Photo link repair for an Immich server, driven entirely through its API.
//!
//! Still images and their motion videos sometimes lose their association. This
//! crate finds the pairs again, links them after confirmation, and records
//! every mutation in a CSV ledger that can later be replayed in reverse. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (filename keys, pairing, run
//!   phases). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (settings, HTTP, ledger files,
//!   console prompts). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`link`], [`unlink`], [`execute`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod link;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod unlink;
