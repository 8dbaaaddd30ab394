//! I/O adapters: settings, server API, listing, ledger files and the console.

pub mod api;
pub mod config;
pub mod confirm;
pub mod ledger;
pub mod listing;
