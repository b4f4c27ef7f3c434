use thiserror::Error;

use crate::ingest::ParseMessageError;
use crate::store::StoreError;

/// Errors surfaced by the command line tool.
///
/// The threading engine itself never fails; everything here comes from
/// reading mail, touching the snapshot file, or bad arguments.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Parse(#[from] ParseMessageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
