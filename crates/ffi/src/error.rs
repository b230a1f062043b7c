use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr;

use bfield_core::{Index3d, StatusCode};

/// Common interface for engine error types.
///
/// - `code()` - Returns the status to be passed across the boundary
/// - `msg()` - Returns the error message for diagnostic purposes
///
/// # Example
/// ```ignore
/// let err = DefaultNativeError::null_pointer("out_handle");
/// assert_eq!(err.code(), StatusCode::NullPointer);
/// assert_eq!(err.msg(), "Parameter 'out_handle' cannot be null");
/// ```
pub trait NativeError {
    /// Returns the status code to be returned across the boundary.
    fn code(&self) -> StatusCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Default implementation of `NativeError` for the engine's failure modes.
///
/// Wraps a `StatusCode` and provides a named constructor for each failure
/// (except Ok, which represents success).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultNativeError {
    code: StatusCode,
    msg: String,
}

impl DefaultNativeError {
    /// Create error for null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_handle"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: StatusCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Create error for poisoned lock.
    ///
    /// # Arguments
    /// * `lock_name` - The name of the lock that was poisoned (e.g., `"field buffers"`)
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: StatusCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Create error for a handle that is zero or no longer registered.
    ///
    /// # Arguments
    /// * `kind` - What the handle should refer to (`"grid"` or `"field"`)
    /// * `handle` - The offending handle value
    pub fn invalid_handle(kind: &str, handle: u64) -> Self {
        Self {
            code: StatusCode::InvalidHandle,
            msg: format!("Unknown {kind} handle {handle:#x}"),
        }
    }

    /// Create error for invalid parameter.
    ///
    /// # Arguments
    /// * `message` - Description of the error
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: StatusCode::InvalidParameter,
            msg: message,
        }
    }

    /// Create error for an index that is not an active cell of the grid.
    pub fn out_of_domain(index: Index3d, dim: Index3d) -> Self {
        Self {
            code: StatusCode::OutOfDomain,
            msg: format!("Cell {index} is not an active cell of the {dim} domain"),
        }
    }

    /// Create error for a component index outside `0..cardinality`.
    pub fn invalid_cardinality(component: c_int, cardinality: usize) -> Self {
        Self {
            code: StatusCode::InvalidCardinality,
            msg: format!("Component {component} outside 0..{cardinality}"),
        }
    }

    /// Create error for a device id outside the grid's device set.
    pub fn invalid_device(device: c_int, num_devices: usize) -> Self {
        Self {
            code: StatusCode::InvalidDevice,
            msg: format!("Device {device} outside 0..{num_devices}"),
        }
    }

    /// Create error for a rejected stream id.
    pub fn invalid_stream(stream: c_int) -> Self {
        Self {
            code: StatusCode::InvalidStream,
            msg: format!("Stream {stream} must be non-negative"),
        }
    }
}

impl NativeError for DefaultNativeError {
    fn code(&self) -> StatusCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

thread_local! {
    /// Thread-local storage for the most recent engine error (C string, status).
    /// The CString is kept here so the pointer handed out by
    /// `bGrid_get_last_error` stays valid until the next call on this thread.
    static LAST_ERROR: RefCell<(Option<CString>, StatusCode)> = const { RefCell::new((None, StatusCode::Ok)) };
}

/// Internal helper to read `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, StatusCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Internal helper to mutate `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, StatusCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent engine error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if the last call on this thread failed.
/// - `null` if it succeeded or the message cannot be converted to a C string.
///
/// # Lifetime
/// The returned pointer is valid until the next engine call on this thread.
///
/// **DO NOT FREE THIS POINTER** - it is managed internally.
#[no_mangle]
pub extern "C" fn bGrid_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent status code recorded on this thread.
#[no_mangle]
pub extern "C" fn bGrid_get_last_error_code() -> c_int {
    with_last_error(|(_cstring, code)| code.raw())
}
