//! Live Photo linker for Immich.
//!
//! `link` finds still images whose companion video lost its association and
//! re-links them; `unlink` reverses a previous run from its ledger CSV.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use livelink::core::types::RunMode;
use livelink::exit_codes;
use livelink::io::api::ImmichClient;
use livelink::io::config::{DEFAULT_CONFIG_PATH, Settings, load_settings};
use livelink::io::confirm::ConsoleConfirm;
use livelink::link::run_link;
use livelink::logging;
use livelink::unlink::run_unlink;

#[derive(Parser)]
#[command(
    name = "livelink",
    version,
    about = "Repair Live Photo/Video links in an Immich server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find unlinked Live Photo/Video pairs and link them.
    Link {
        /// Identify and report pairs without making changes.
        #[arg(long, conflicts_with = "test_run")]
        dry_run: bool,
        /// Link only the first identified pair as a test.
        #[arg(long)]
        test_run: bool,
        /// Path to the configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Unlink pairs recorded in a ledger CSV written by `link`.
    Unlink {
        /// Ledger CSV listing the pairs to unlink.
        #[arg(long)]
        linked_csv: PathBuf,
        /// Report what would be unlinked without making changes.
        #[arg(long)]
        dry_run: bool,
        /// Path to the configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Link {
            dry_run,
            test_run,
            config,
        } => {
            let settings = resolve_settings(&config)?;
            let api = ImmichClient::new(&settings).context("build http client")?;
            let mut confirm = ConsoleConfirm::stdio();
            let report = run_link(
                &api,
                &mut confirm,
                &settings,
                RunMode::from_flags(dry_run, test_run),
            )?;
            Ok(report.exit_code())
        }
        Command::Unlink {
            linked_csv,
            dry_run,
            config,
        } => {
            let settings = resolve_settings(&config)?;
            let api = ImmichClient::new(&settings).context("build http client")?;
            let mut confirm = ConsoleConfirm::stdio();
            let report = run_unlink(
                &api,
                &mut confirm,
                &settings,
                &linked_csv,
                RunMode::from_flags(dry_run, false),
            )?;
            Ok(report.exit_code())
        }
    }
}

fn resolve_settings(config: &Path) -> Result<Settings> {
    load_settings(config, |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_link_defaults_to_full_run() {
        let cli = Cli::parse_from(["livelink", "link"]);
        match cli.command {
            Command::Link {
                dry_run,
                test_run,
                config,
            } => {
                assert_eq!(RunMode::from_flags(dry_run, test_run), RunMode::FullRun);
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_PATH));
            }
            Command::Unlink { .. } => panic!("expected link"),
        }
    }

    #[test]
    fn parse_link_test_run_with_config() {
        let cli = Cli::parse_from(["livelink", "link", "--test-run", "--config", "alt.toml"]);
        assert!(matches!(
            cli.command,
            Command::Link { dry_run: false, test_run: true, ref config } if config == &PathBuf::from("alt.toml")
        ));
    }

    #[test]
    fn dry_run_and_test_run_conflict() {
        assert!(Cli::try_parse_from(["livelink", "link", "--dry-run", "--test-run"]).is_err());
    }

    #[test]
    fn unlink_requires_ledger() {
        assert!(Cli::try_parse_from(["livelink", "unlink"]).is_err());
        let cli = Cli::parse_from(["livelink", "unlink", "--linked-csv", "out.csv", "--dry-run"]);
        assert!(matches!(cli.command, Command::Unlink { dry_run: true, .. }));
    }
}
