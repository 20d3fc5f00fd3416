//! Error taxonomy for the storage core (§7).
//!
//! `ConflictRestart` is deliberately not a variant here: it is an internal
//! control-flow signal, never surfaced across the public API boundary. It
//! lives in [`Signal`] and is caught by the restart-loop helper in
//! `index::btree`.

use thiserror::Error;

/// Errors the public API can return.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    Duplicate,

    #[error("entry exceeds effective page size")]
    OutOfSpace,

    #[error("page invariant violated: {0}")]
    Corruption(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown tree: {0}")]
    TreeNotFound(String),

    #[error("tree already registered: {0}")]
    TreeExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Internal unwind signal threaded through guard and tree operations.
///
/// Every hybrid-latch operation that can lose a race returns a
/// [`Signal`]-flavored result; [`crate::index::btree::restart_loop`] is the
/// single place that catches `Restart` and retries the whole operation from
/// its entry point, matching the "restart boundary" of §5.
#[derive(Debug)]
pub(crate) enum Signal {
    /// A version check failed somewhere in the walk; the whole operation
    /// must restart from its entry point. Never returned to callers.
    Restart,
    /// A real, user-visible error.
    Err(StorageError),
}

pub(crate) type Latched<T> = std::result::Result<T, Signal>;

impl From<StorageError> for Signal {
    fn from(e: StorageError) -> Self {
        Signal::Err(e)
    }
}

impl From<std::io::Error> for Signal {
    fn from(e: std::io::Error) -> Self {
        Signal::Err(StorageError::Io(e))
    }
}
