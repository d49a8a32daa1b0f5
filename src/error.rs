//! Error types for ledger integrity and accounting

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Incompatible diff: expected {expected}, found {found}")]
    IncompatibleDiff { expected: String, found: String },

    #[error("Previous reading is zero, relative diff is undefined: {0}")]
    ZeroBaseline(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown hash algorithm id: {0}")]
    UnknownHasher(String),

    #[error("Malformed merkle tree: {0}")]
    MalformedTree(String),

    #[error("Hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("Payout pool {pool} does not equal the sum of outputs {outputs}")]
    PayoutMismatch { pool: String, outputs: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Unknown data formula: {0}")]
    UnknownFormula(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
