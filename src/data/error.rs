/// Error taxonomy for the core stores and session persistence.

use std::io;
use thiserror::Error;

/// Malformed or unreadable input file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No {role} column found (headers: {headers})")]
    MissingColumn { role: &'static str, headers: String },
    #[error("Line {line}: invalid {column} value {value:?}")]
    BadValue {
        line: usize,
        column: String,
        value: String,
    },
    #[error("Line {line}: time {time} goes backwards (previous {previous})")]
    NonMonotonic { line: usize, time: f64, previous: f64 },
    #[error("File contains no data rows")]
    Empty,
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("Unsupported frame layout: {0}")]
    UnsupportedFrame(String),
}

/// An operation needs data that has not been loaded yet.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0} not loaded")]
pub struct DataUnavailable(pub &'static str);

/// Event or annotation index outside the valid range.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Index {index} out of range (length {len})")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

/// Corrupt or structurally incompatible session snapshot.
#[derive(Error, Debug)]
pub enum SessionLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Snapshot format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SessionSaveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures of session-level editing operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailable),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Unknown pin {0}")]
    UnknownPin(String),
    #[error("Nothing to undo")]
    NothingToUndo,
}
