use std::os::raw::c_int;

use tracing::debug;

use crate::api::{Bindings, DeleteFn};
use crate::error::{FieldError, Result};

/// An exclusively owned native handle.
///
/// Zero means "no object": either creation never succeeded or the handle was
/// already released. Release clears the value before calling into the engine,
/// so deletion is attempted at most once even when it fails.
#[derive(Debug)]
pub(crate) struct OwnedHandle {
    raw: u64,
    what: &'static str,
}

impl OwnedHandle {
    /// Runs a native create call that writes the new handle through its
    /// out-pointer.
    pub(crate) fn create(
        what: &'static str,
        bindings: &Bindings,
        create: impl FnOnce(*mut u64) -> c_int,
    ) -> Result<Self> {
        let mut raw = 0u64;
        let status = create(&mut raw);
        bindings
            .check(status)
            .map_err(|failure| FieldError::Initialization { what, failure })?;
        if raw == 0 {
            return Err(FieldError::InvalidHandle { what });
        }
        debug!("Created native {what} {raw:#x}");
        Ok(Self { raw, what })
    }

    /// Live handle value, or `InvalidHandle` once released.
    pub(crate) fn get(&self) -> Result<u64> {
        if self.raw == 0 {
            return Err(FieldError::InvalidHandle { what: self.what });
        }
        Ok(self.raw)
    }

    /// Raw value without the liveness check.
    pub(crate) fn raw(&self) -> u64 {
        self.raw
    }

    /// Deletes the native object. No-op when already released.
    pub(crate) fn release(&mut self, bindings: &Bindings, delete: DeleteFn) -> Result<()> {
        if self.raw == 0 {
            return Ok(());
        }
        let mut raw = std::mem::take(&mut self.raw);
        let released = raw;
        // SAFETY: `raw` was issued by this library's create call and has not
        // been passed to delete before.
        let status = unsafe { delete(&mut raw) };
        bindings.check(status).map_err(|failure| FieldError::Teardown {
            what: self.what,
            failure,
        })?;
        debug!("Deleted native {} {released:#x}", self.what);
        Ok(())
    }
}
