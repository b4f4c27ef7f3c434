//! Message source for the command line tool.
//!
//! Walks a directory of raw messages (maildir `cur/` and `new/`, or a folder
//! of `.eml` files), parses them in parallel and returns the records. Files
//! that fail to parse are logged and skipped; they never abort the run.

pub mod parser;

use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::models::MessageRecord;

pub use parser::{ParseMessageError, parse_message, parse_message_file};

/// Outcome of ingesting a directory.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub messages: Vec<MessageRecord>,
    pub failed: Vec<(PathBuf, ParseMessageError)>,
}

/// Recursively list regular files under `dir`, skipping dotfiles and maildir `tmp/`.
fn collect_message_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if name != "tmp" {
                    pending.push(entry.path());
                }
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse every message file below `dir`.
///
/// Parsing runs on the rayon pool; the returned records are in path order.
pub fn ingest_directory(dir: &Path) -> io::Result<IngestReport> {
    let files = collect_message_files(dir)?;
    log::info!("ingesting {} files from {}", files.len(), dir.display());

    let results: Vec<(PathBuf, Result<MessageRecord, ParseMessageError>)> = files
        .into_par_iter()
        .map(|path| {
            let parsed = parse_message_file(&path);
            (path, parsed)
        })
        .collect();

    let mut report = IngestReport::default();
    for (path, parsed) in results {
        match parsed {
            Ok(record) => report.messages.push(record),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                report.failed.push((path, e));
            }
        }
    }

    log::info!(
        "ingested {} messages ({} failed)",
        report.messages.len(),
        report.failed.len()
    );
    Ok(report)
}
