use std::ffi::CString;
use std::os::raw::c_int;

use bfield_core::StatusCode;

use crate::error::{with_last_error_mut, NativeError};

/// Set the thread-local error message and code.
/// Accepts any type implementing `NativeError` trait.
pub(crate) fn set_last_error(error: &impl NativeError) {
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Clear the thread-local error message and code.
/// Called on successful operations.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = StatusCode::Ok;
    });
}

/// Track an error by setting it in thread-local storage and returning its raw code.
#[inline]
pub(crate) fn track_error(error: &impl NativeError) -> c_int {
    set_last_error(error);
    error.code().raw()
}

/// Converts an engine result to a raw status, recording or clearing the last error.
pub(crate) fn track_status<E: NativeError>(result: Result<(), E>) -> c_int {
    match result {
        Ok(()) => {
            clear_last_error();
            StatusCode::Ok.raw()
        }
        Err(e) => track_error(&e),
    }
}

/// Track a result: records the error on failure, clears it on success, and
/// hands back the raw code in place of the error.
pub(crate) fn track_result<T, E: NativeError>(result: Result<T, E>) -> Result<T, c_int> {
    match result {
        Ok(value) => {
            clear_last_error();
            Ok(value)
        }
        Err(e) => Err(track_error(&e)),
    }
}
