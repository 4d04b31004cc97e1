//! Error types shared by every component of the engine
//!
//! Every fallible operation returns [`Result<T>`]. Failures are synchronous and
//! never retried internally; operations build their outputs as fresh values, so
//! an error never leaves a half-written ciphertext behind.
//!
//! Numerical degradation (undersized gadget rank, inputs outside the bootstrap
//! approximation range) is not an error: it shows up as approximation error.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by context construction, encoding, key management and evaluation
#[derive(Debug, Error)]
pub enum HeError {
    /// Invalid context construction parameters or preset mismatch
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Wrong level, nonzero rescale counter, slots out of range, device mismatch
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Switching key absent from the key pack (and from its key directory)
    #[error("missing key: {0}")]
    MissingKey(String),

    /// Operands at incompatible level / rescale-counter combinations
    #[error("state mismatch: {0}")]
    StateMismatch(String),

    /// File could not be opened, read or written
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binary stream could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl HeError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        HeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HeError>;

/// Shorthand for `Err(HeError::Precondition(..))` with `format!` arguments
macro_rules! precondition {
    ($($arg:tt)*) => {
        return Err($crate::error::HeError::Precondition(format!($($arg)*)))
    };
}

/// Shorthand for `Err(HeError::StateMismatch(..))` with `format!` arguments
macro_rules! state_mismatch {
    ($($arg:tt)*) => {
        return Err($crate::error::HeError::StateMismatch(format!($($arg)*)))
    };
}

pub(crate) use precondition;
pub(crate) use state_mismatch;
