//! Error types for fqfilter operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for fqfilter operations.
pub type Result<T> = std::result::Result<T, FqFilterError>;

/// Why a single 4-line unit could not be decoded as a FASTQ record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected 4 lines per record, found {0}")]
    WrongLineCount(usize),

    #[error("identifier line does not start with '@'")]
    MissingIdMarker,

    #[error("separator line does not start with '+'")]
    MissingSeparator,

    #[error("sequence length {seq} does not match quality length {qual}")]
    LengthMismatch { seq: usize, qual: usize },
}

/// Error type for fqfilter operations.
#[derive(Error, Debug)]
pub enum FqFilterError {
    /// Malformed FASTQ unit.
    #[error("Invalid FASTQ file '{path}' at line {line} (record {record}): {source}")]
    Format {
        /// Input file
        path: PathBuf,
        /// 1-based line number of the unit's identifier line
        line: u64,
        /// 1-based record index
        record: u64,
        #[source]
        source: FormatError,
    },

    /// The compressed stream or its text could not be decoded.
    #[error("Corrupt input '{path}' near line {line}: {source}")]
    CorruptInput {
        path: PathBuf,
        line: u64,
        #[source]
        source: io::Error,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Adapter list entry that cannot be loaded into the trie.
    #[error("Invalid adapter in '{path}' at line {line}: {reason}")]
    InvalidAdapter { path: PathBuf, line: usize, reason: String },

    /// Raised only when adapters are required and the list holds none.
    #[error("Adapter list '{path}' contains no usable adapters")]
    EmptyAdapterList { path: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a worker thread panicked")]
    WorkerPanicked,
}

impl FqFilterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
    }
}
