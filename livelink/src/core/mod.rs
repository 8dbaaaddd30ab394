//! Deterministic, pure logic shared by the link and unlink flows.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod filename;
pub mod pairing;
pub mod phase;
pub mod types;
