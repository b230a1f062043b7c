//! Native entry points and the binder that owns them.
//!
//! An [`EntryPoints`] table is a plain set of `extern "C"` function pointers.
//! It is either filled from a dynamic library (see [`crate::registry`]) or
//! built directly from statically linked functions. [`Bindings`] keeps the
//! table together with the library that backs it, so the pointers stay valid
//! for as long as any proxy holds the `Arc<Bindings>`.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use crate::config::{BindingConfig, GridKind};
use crate::error::{FieldError, Result};
use crate::registry;
use crate::status::NativeFailure;
use crate::types::{BlockPartition, Index3d};

/// `(grid_out, dim, num_devices, mask_or_null) -> status`
pub type GridNewFn = unsafe extern "C" fn(*mut u64, Index3d, c_int, *const u8) -> c_int;
/// `(handle_in_out) -> status`; the engine zeroes the handle on success.
pub type DeleteFn = unsafe extern "C" fn(*mut u64) -> c_int;
/// `(grid, index) -> 1 inside, 0 outside, negative status on error`
pub type IsInsideDomainFn = unsafe extern "C" fn(u64, Index3d) -> c_int;
/// `(field_out, grid) -> status`
pub type FieldNewFn = unsafe extern "C" fn(*mut u64, u64) -> c_int;
/// `(field, partition_out, execution, device, data_view) -> status`
pub type GetPartitionFn =
    unsafe extern "C" fn(u64, *mut BlockPartition, c_int, c_int, c_int) -> c_int;
/// `(partition) -> size in bytes of the engine's partition struct`
pub type PartitionSizeFn = unsafe extern "C" fn(*const BlockPartition) -> c_int;
/// `(field, index, cardinality) -> value`
pub type ReadFn = unsafe extern "C" fn(u64, Index3d, c_int) -> c_int;
/// `(field, index, cardinality, value) -> status`
pub type WriteFn = unsafe extern "C" fn(u64, Index3d, c_int, c_int) -> c_int;
/// `(field, stream) -> status`
pub type UpdateFn = unsafe extern "C" fn(u64, c_int) -> c_int;
/// `() -> thread-local message or null`
pub type LastErrorFn = unsafe extern "C" fn() -> *const c_char;
/// `() -> status of the calling thread's latest call`
pub type LastErrorCodeFn = unsafe extern "C" fn() -> c_int;

/// Grid entry points.
#[derive(Debug, Clone, Copy)]
pub struct GridEntryPoints {
    pub new: GridNewFn,
    pub delete: DeleteFn,
    pub is_inside_domain: IsInsideDomainFn,
}

/// Field entry points.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntryPoints {
    pub new: FieldNewFn,
    pub delete: DeleteFn,
    pub get_partition: GetPartitionFn,
    pub partition_size: PartitionSizeFn,
    pub read: ReadFn,
    pub write: WriteFn,
    pub update_host_data: UpdateFn,
    pub update_device_data: UpdateFn,
}

/// Full table of entry points for one grid kind.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub grid: GridEntryPoints,
    pub field: FieldEntryPoints,
    /// Optional; when present its message is attached to every native failure.
    pub last_error: Option<LastErrorFn>,
    /// Optional; lets value-returning calls such as `read` report failures.
    pub last_error_code: Option<LastErrorCodeFn>,
}

/// Resolves `name` from `library` as a value of type `T`.
///
/// # Safety
/// `T` must match the actual type of the exported symbol.
unsafe fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T> {
    debug!("Resolving native symbol {name}");
    library
        .get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|source| FieldError::MissingSymbol {
            symbol: name.to_string(),
            source,
        })
}

impl EntryPoints {
    /// Resolves every entry point of `kind` from `library`.
    ///
    /// # Safety
    /// The library must export the symbols with exactly the signatures
    /// declared in this module.
    pub unsafe fn resolve(library: &Library, kind: GridKind) -> Result<Self> {
        let grid = GridEntryPoints {
            new: resolve(library, &kind.symbol("new"))?,
            delete: resolve(library, &kind.symbol("delete"))?,
            is_inside_domain: resolve(library, &kind.symbol("is_inside_domain"))?,
        };
        let field = FieldEntryPoints {
            new: resolve(library, &kind.symbol("bField_new"))?,
            delete: resolve(library, &kind.symbol("bField_delete"))?,
            get_partition: resolve(library, &kind.symbol("bField_get_partition"))?,
            partition_size: resolve(library, &kind.symbol("bField_partition_size"))?,
            read: resolve(library, &kind.symbol("bField_read"))?,
            write: resolve(library, &kind.symbol("bField_write"))?,
            update_host_data: resolve(library, &kind.symbol("bField_update_host_data"))?,
            update_device_data: resolve(library, &kind.symbol("bField_update_device_data"))?,
        };
        let last_error = resolve::<LastErrorFn>(library, &kind.symbol("get_last_error")).ok();
        let last_error_code =
            resolve::<LastErrorCodeFn>(library, &kind.symbol("get_last_error_code")).ok();

        Ok(Self {
            grid,
            field,
            last_error,
            last_error_code,
        })
    }
}

/// Bound entry points plus whatever keeps them alive.
pub struct Bindings {
    label: String,
    kind: GridKind,
    entry_points: EntryPoints,
    // Dropped last: the function pointers above point into it.
    library: Option<Library>,
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("dynamic", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

impl Bindings {
    /// Wraps entry points that are linked into the current binary.
    #[must_use]
    pub fn from_entry_points(label: impl Into<String>, entry_points: EntryPoints) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            kind: GridKind::BGrid,
            entry_points,
            library: None,
        })
    }

    /// Binds the library named by `config`, reusing a live binding of the
    /// same library and grid kind if one exists.
    pub fn load(config: &BindingConfig) -> Result<Arc<Self>> {
        registry::bind(config)
    }

    /// Opens `path` and resolves all entry points of `kind`. Bypasses the registry.
    pub(crate) fn open(path: &Path, kind: GridKind) -> Result<Self> {
        // SAFETY: loading a library runs its initialisers; the caller chose
        // to trust it by naming it in the binding config.
        let library = unsafe { Library::new(path) }.map_err(|source| FieldError::Load {
            path: PathBuf::from(path),
            source,
        })?;
        // SAFETY: the symbol family is declared with the signatures above.
        let entry_points = unsafe { EntryPoints::resolve(&library, kind)? };

        Ok(Self {
            label: path.display().to_string(),
            kind,
            entry_points,
            library: Some(library),
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> GridKind {
        self.kind
    }

    #[must_use]
    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    pub(crate) fn grid(&self) -> &GridEntryPoints {
        &self.entry_points.grid
    }

    pub(crate) fn field(&self) -> &FieldEntryPoints {
        &self.entry_points.field
    }

    /// Latest message recorded by the engine on this thread.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        let last_error = self.entry_points.last_error?;
        // SAFETY: the engine returns either null or a NUL-terminated string
        // that stays valid until its next call on this thread.
        unsafe {
            let ptr = last_error();
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }

    /// Status the engine recorded for this thread's latest call; 0 when the
    /// engine does not export a status getter.
    pub(crate) fn last_status(&self) -> c_int {
        // SAFETY: the getter takes no arguments and only reads thread-local state.
        self.entry_points
            .last_error_code
            .map_or(0, |last_error_code| unsafe { last_error_code() })
    }

    /// Decodes `status`, attaching the engine's message on failure.
    pub(crate) fn check(&self, status: c_int) -> std::result::Result<(), NativeFailure> {
        match NativeFailure::from_status(status) {
            None => Ok(()),
            Some(failure) => Err(failure.with_message(self.last_error())),
        }
    }
}
