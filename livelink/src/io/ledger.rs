//! Audit ledger CSV: the record of every mutation and the input for reversal.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::core::types::LedgerRecord;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger {path} line {line}: {message}")]
    Format {
        path: PathBuf,
        line: u64,
        message: String,
    },
    #[error("ledger {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Which run produced a ledger file; selects the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Linked,
    TestRun,
    DryRun,
    Unlinked,
}

/// File name for a new ledger, e.g. `linked_assets_2024_01_31_235959.csv`.
pub fn ledger_file_name(kind: LedgerKind, at: DateTime<Utc>) -> String {
    let prefix = match kind {
        LedgerKind::Linked => "linked_assets",
        LedgerKind::TestRun => "TEST_RUN_linked_assets",
        LedgerKind::DryRun => "DRY_RUN_linked_assets",
        LedgerKind::Unlinked => "unlinked_assets",
    };
    format!("{prefix}_{}.csv", at.format("%Y_%m_%d_%H%M%S"))
}

/// Append-only ledger writer. Every row is flushed before `append` returns.
pub struct LedgerWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl LedgerWriter {
    /// Create the file (and parent directories) and write the header row.
    pub fn create(path: &Path) -> Result<Self, LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        // Header is written explicitly so an empty run still leaves a valid ledger.
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(LEDGER_COLUMNS)
            .and_then(|()| writer.flush().map_err(csv::Error::from))
            .map_err(|source| LedgerError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "ledger created");
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn append(&mut self, record: &LedgerRecord) -> Result<(), LedgerError> {
        self.writer
            .serialize(record)
            .map_err(|source| LedgerError::Csv {
                path: self.path.clone(),
                source,
            })?;
        self.writer.flush().map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Column names, in [`LedgerRecord`] field order.
pub const LEDGER_COLUMNS: [&str; 7] = [
    "photo_asset_id",
    "video_asset_id",
    "photo_filename",
    "video_filename",
    "operated_at",
    "outcome",
    "error",
];

/// Read every record from an existing ledger.
///
/// Fails on the first malformed row with its line number (the header is
/// line 1).
pub fn read_ledger(path: &Path) -> Result<Vec<LedgerRecord>, LedgerError> {
    let file = File::open(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    if headers.iter().ne(LEDGER_COLUMNS) {
        return Err(LedgerError::Format {
            path: path.to_path_buf(),
            line: 1,
            message: format!(
                "unexpected header {:?}, expected {}",
                headers.iter().collect::<Vec<_>>(),
                LEDGER_COLUMNS.join(",")
            ),
        });
    }

    let mut records = Vec::new();
    let mut raw = csv::StringRecord::new();
    loop {
        let fallback_line = reader.position().line();
        let more = reader.read_record(&mut raw).map_err(|err| LedgerError::Format {
            path: path.to_path_buf(),
            line: err.position().map_or(fallback_line, |pos| pos.line()),
            message: describe_csv_error(&err),
        })?;
        if !more {
            break;
        }
        // Quoted fields may span lines, so take the line where this record starts.
        let line = raw.position().map_or(fallback_line, |pos| pos.line());
        let format_error = |message: String| LedgerError::Format {
            path: path.to_path_buf(),
            line,
            message,
        };
        let record: LedgerRecord = raw
            .deserialize(Some(&headers))
            .map_err(|err| format_error(describe_csv_error(&err)))?;
        if let Some(problem) = row_problem(&record) {
            return Err(format_error(problem.to_string()));
        }
        records.push(record);
    }
    debug!(path = %path.display(), rows = records.len(), "ledger read");
    Ok(records)
}

fn row_problem(record: &LedgerRecord) -> Option<&'static str> {
    if record.photo_asset_id.trim().is_empty() {
        return Some("empty photo_asset_id");
    }
    if record.video_asset_id.trim().is_empty() {
        return Some("empty video_asset_id");
    }
    if record.photo_asset_id == record.video_asset_id {
        return Some("photo_asset_id and video_asset_id are identical");
    }
    None
}

fn describe_csv_error(err: &csv::Error) -> String {
    match err.kind() {
        csv::ErrorKind::Deserialize { err, .. } => match err.field() {
            Some(field) => {
                let column = LEDGER_COLUMNS
                    .get(field as usize)
                    .copied()
                    .unwrap_or("?");
                format!("column {column}: {}", err.kind())
            }
            None => err.kind().to_string(),
        },
        _ => err.to_string(),
    }
}
