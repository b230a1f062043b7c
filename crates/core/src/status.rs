//! Status codes returned across the call boundary.
//!
//! Follows the C convention: 0 = success, non-zero = failure. Native engines
//! return one of the [`StatusCode`] values; anything else is kept verbatim as
//! [`FailureKind::Unknown`] so no information is lost.

use std::fmt;
use std::os::raw::c_int;

/// Closed set of status codes understood by both sides.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Handle is zero, stale, or was never issued by this library.
    InvalidHandle = 1,

    /// Null pointer passed where non-null required.
    NullPointer = 2,

    /// Argument outside its accepted range (bad enum discriminant, bad dimensions).
    InvalidParameter = 3,

    /// Index lies outside the grid's active cells.
    OutOfDomain = 4,

    /// Component index outside `0..cardinality`.
    InvalidCardinality = 5,

    /// Device id not part of the grid's device set.
    InvalidDevice = 6,

    /// Stream id rejected by the engine.
    InvalidStream = 7,

    /// Internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 8,
}

impl StatusCode {
    pub const ALL: [StatusCode; 9] = [
        StatusCode::Ok,
        StatusCode::InvalidHandle,
        StatusCode::NullPointer,
        StatusCode::InvalidParameter,
        StatusCode::OutOfDomain,
        StatusCode::InvalidCardinality,
        StatusCode::InvalidDevice,
        StatusCode::InvalidStream,
        StatusCode::LockPoisoned,
    ];

    /// Raw value as seen by C.
    #[must_use]
    pub const fn raw(self) -> c_int {
        self as c_int
    }

    /// Decodes a raw status; `None` for values outside the taxonomy.
    #[must_use]
    pub fn from_raw(raw: c_int) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.raw() == raw)
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusCode::Ok => "ok",
            StatusCode::InvalidHandle => "invalid handle",
            StatusCode::NullPointer => "null pointer",
            StatusCode::InvalidParameter => "invalid parameter",
            StatusCode::OutOfDomain => "index outside the active domain",
            StatusCode::InvalidCardinality => "invalid cardinality",
            StatusCode::InvalidDevice => "invalid device",
            StatusCode::InvalidStream => "invalid stream",
            StatusCode::LockPoisoned => "lock poisoned",
        };
        f.write_str(text)
    }
}

/// Decoded cause of a failed native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Known(StatusCode),
    Unknown(c_int),
}

/// A failed native call: the decoded status plus the engine's message, if it
/// exposes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    pub kind: FailureKind,
    pub message: Option<String>,
}

impl NativeFailure {
    /// Decodes a non-zero raw status. Returns `None` for success.
    #[must_use]
    pub fn from_status(raw: c_int) -> Option<Self> {
        let kind = match StatusCode::from_raw(raw) {
            Some(StatusCode::Ok) => return None,
            Some(code) => FailureKind::Known(code),
            None => FailureKind::Unknown(raw),
        };
        Some(Self {
            kind,
            message: None,
        })
    }

    #[must_use]
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// The decoded code, if it belongs to the taxonomy.
    #[must_use]
    pub fn code(&self) -> Option<StatusCode> {
        match self.kind {
            FailureKind::Known(code) => Some(code),
            FailureKind::Unknown(_) => None,
        }
    }

    /// The raw value returned by the engine.
    #[must_use]
    pub fn raw(&self) -> c_int {
        match self.kind {
            FailureKind::Known(code) => code.raw(),
            FailureKind::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Known(code) => write!(f, "{code} (status {})", code.raw())?,
            FailureKind::Unknown(raw) => write!(f, "unknown status {raw}")?,
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
