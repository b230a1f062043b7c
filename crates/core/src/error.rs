use std::path::PathBuf;

use thiserror::Error;

use crate::status::NativeFailure;

/// Errors raised by the client side of the binding.
///
/// Every variant is raised at the call site; nothing is retried locally.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A handle that must be live is zero. Raised before any native call.
    #[error("invalid {what} handle")]
    InvalidHandle { what: &'static str },

    /// Native creation of a grid or field failed.
    #[error("failed to initialize {what}: {failure}")]
    Initialization {
        what: &'static str,
        failure: NativeFailure,
    },

    /// Native deletion of a grid or field failed.
    #[error("failed to delete {what}: {failure}")]
    Teardown {
        what: &'static str,
        failure: NativeFailure,
    },

    /// Any other forwarded call returned a non-zero status.
    #[error("native call `{operation}` failed: {failure}")]
    NativeCall {
        operation: &'static str,
        failure: NativeFailure,
    },

    /// The native engine and this crate disagree on the partition layout.
    #[error("partition layout mismatch: native size {native} != local size {local}")]
    LayoutMismatch { native: usize, local: usize },

    /// Grid descriptor rejected before reaching the native engine.
    #[error("invalid grid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The dynamic library could not be opened.
    #[error("failed to load native library {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required entry point is missing from the library.
    #[error("missing native symbol `{symbol}`: {source}")]
    MissingSymbol {
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    /// A lock guarding shared binding state was poisoned.
    #[error("lock '{0}' was poisoned by a panic in another thread")]
    LockPoisoned(&'static str),
}

pub type Result<T> = std::result::Result<T, FieldError>;

impl FieldError {
    /// The native failure behind this error, if it came from a native call.
    #[must_use]
    pub fn native_failure(&self) -> Option<&NativeFailure> {
        match self {
            FieldError::Initialization { failure, .. }
            | FieldError::Teardown { failure, .. }
            | FieldError::NativeCall { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
