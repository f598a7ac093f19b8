//! Error types for the variant engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A transition the engine state machine does not allow, e.g. narrowing
    /// samples after the genotype columns have been materialized.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Merge inputs disagree on their sample lists (or there is nothing to merge).
    #[error("incompatible merge: {0}")]
    IncompatibleMerge(String),

    /// Backing file or its positional index is missing or unreadable.
    #[error("cannot open indexed variant file {path}: {msg}")]
    Index { path: String, msg: String },

    #[error("unknown sample '{0}'")]
    UnknownSample(String),

    #[error("sample '{0}' occurs more than once")]
    DuplicateSample(String),

    /// A record's genotype column count disagrees with the sample list.
    #[error("record {locus} has {found} genotypes, expected {expected} or 0")]
    SampleMismatch {
        locus: String,
        found: usize,
        expected: usize,
    },

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("malformed VCF at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompression error: {0}")]
    Decompress(#[from] niffler::Error),

    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),
}
