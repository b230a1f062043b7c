//! Client-side proxy for a native field.

use std::mem::size_of;
use std::os::raw::c_int;
use std::sync::Arc;

use tracing::error;

use crate::api::Bindings;
use crate::error::{FieldError, Result};
use crate::handle::OwnedHandle;
use crate::types::{BlockPartition, DataView, DeviceId, Execution, FieldHandle, GridHandle, Index3d, StreamId};

/// A native field defined over a grid.
///
/// Owns the native field handle: it is created in [`Field::new`] and deleted
/// exactly once, either by [`Field::close`] or when the proxy is dropped.
/// Every operation is a single blocking call into the engine; nothing is
/// cached locally.
///
/// The grid handle is a back-reference only. Keeping the grid alive while the
/// field is in use is the caller's job.
#[derive(Debug)]
pub struct Field {
    bindings: Arc<Bindings>,
    grid: GridHandle,
    handle: OwnedHandle,
}

impl Field {
    /// Creates a native field over `grid`.
    ///
    /// # Errors
    /// - `InvalidHandle` if `grid` is zero; no native call is made.
    /// - `Initialization` if the engine rejects the creation.
    pub fn new(bindings: &Arc<Bindings>, grid: GridHandle) -> Result<Self> {
        if grid.is_null() {
            return Err(FieldError::InvalidHandle { what: "grid" });
        }
        let new = bindings.field().new;
        // SAFETY: the out-pointer is a live stack slot and `grid` is non-zero.
        let handle =
            OwnedHandle::create("field", bindings, |out| unsafe { new(out, grid.0) })?;

        Ok(Self {
            bindings: Arc::clone(bindings),
            grid,
            handle,
        })
    }

    /// Native handle of this field. Zero after [`Field::close`] failed midway.
    #[must_use]
    pub fn handle(&self) -> FieldHandle {
        FieldHandle(self.handle.raw())
    }

    #[must_use]
    pub fn grid(&self) -> GridHandle {
        self.grid
    }

    #[must_use]
    pub fn bindings(&self) -> &Arc<Bindings> {
        &self.bindings
    }

    /// Value of component `cardinality` at `index`.
    ///
    /// The component range is enforced by the engine, not here. The native
    /// read returns the value itself, so failures are picked up from the
    /// engine's last-status getter when it exports one.
    pub fn read(&self, index: Index3d, cardinality: i32) -> Result<i32> {
        let handle = self.handle.get()?;
        // SAFETY: `handle` is live for the lifetime of `self`.
        let value = unsafe { (self.bindings.field().read)(handle, index, cardinality) };
        self.check("read", self.bindings.last_status())?;
        Ok(value)
    }

    /// Stores `value` in component `cardinality` at `index`.
    pub fn write(&mut self, index: Index3d, cardinality: i32, value: i32) -> Result<()> {
        let handle = self.handle.get()?;
        // SAFETY: `handle` is live and exclusively borrowed.
        let status = unsafe { (self.bindings.field().write)(handle, index, cardinality, value) };
        self.check("write", status)
    }

    /// Copies device memory back to the host on `stream`.
    pub fn update_host_data(&mut self, stream: StreamId) -> Result<()> {
        let handle = self.handle.get()?;
        // SAFETY: `handle` is live and exclusively borrowed.
        let status = unsafe { (self.bindings.field().update_host_data)(handle, stream.0) };
        self.check("update_host_data", status)
    }

    /// Copies host memory to the devices on `stream`.
    pub fn update_device_data(&mut self, stream: StreamId) -> Result<()> {
        let handle = self.handle.get()?;
        // SAFETY: `handle` is live and exclusively borrowed.
        let status = unsafe { (self.bindings.field().update_device_data)(handle, stream.0) };
        self.check("update_device_data", status)
    }

    /// Raw descriptor of `device`'s slice of this field.
    ///
    /// The engine reports the size of its own partition struct; a mismatch
    /// with [`BlockPartition`] means the two sides were built against
    /// different layouts and is reported as `LayoutMismatch`.
    pub fn partition(
        &self,
        execution: Execution,
        device: DeviceId,
        data_view: DataView,
    ) -> Result<BlockPartition> {
        let handle = self.handle.get()?;
        let api = self.bindings.field();
        let mut partition = BlockPartition::default();

        // SAFETY: `partition` is a live, correctly sized out-parameter.
        let status = unsafe {
            (api.get_partition)(
                handle,
                &mut partition,
                execution as c_int,
                device.0,
                data_view as c_int,
            )
        };
        self.check("get_partition", status)?;

        // SAFETY: `partition` was just filled in by the engine.
        let native = unsafe { (api.partition_size)(&partition) };
        let local = size_of::<BlockPartition>();
        if usize::try_from(native).ok() != Some(local) {
            return Err(FieldError::LayoutMismatch {
                native: usize::try_from(native).unwrap_or(0),
                local,
            });
        }

        Ok(partition)
    }

    /// Deletes the native field, reporting a failed deletion.
    ///
    /// Dropping the proxy does the same but can only log the failure.
    pub fn close(mut self) -> Result<()> {
        let delete = self.bindings.field().delete;
        self.handle.release(&self.bindings, delete)
    }

    fn check(&self, operation: &'static str, status: c_int) -> Result<()> {
        self.bindings
            .check(status)
            .map_err(|failure| FieldError::NativeCall { operation, failure })
    }
}

impl Drop for Field {
    fn drop(&mut self) {
        let delete = self.bindings.field().delete;
        if let Err(e) = self.handle.release(&self.bindings, delete) {
            error!("Failed to release field over {}: {e}", self.grid);
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! Recording stand-in for a native engine.
    //!
    //! State is thread-local so tests running in parallel don't see each
    //! other's calls.

    use std::cell::RefCell;
    use std::ffi::CString;
    use std::os::raw::{c_char, c_int};
    use std::ptr;
    use std::sync::Arc;

    use rustc_hash::FxHashMap;

    use crate::api::{Bindings, EntryPoints, FieldEntryPoints, GridEntryPoints};
    use crate::status::StatusCode;
    use crate::types::{BlockPartition, Index3d};

    #[derive(Debug, Default)]
    pub(crate) struct StubState {
        pub next_handle: u64,
        pub grid_creates: Vec<Index3d>,
        pub grid_deletes: Vec<u64>,
        pub field_creates: Vec<u64>,
        pub field_deletes: Vec<u64>,
        pub cells: FxHashMap<(u64, Index3d, c_int), c_int>,
        pub host_updates: Vec<(u64, c_int)>,
        pub device_updates: Vec<(u64, c_int)>,
        pub fail_create: Option<StatusCode>,
        pub fail_delete: Option<StatusCode>,
        pub fail_write: Option<c_int>,
        pub update_status: c_int,
        pub partition_size_delta: c_int,
        pub last_error: Option<CString>,
        pub last_status: c_int,
    }

    thread_local! {
        pub(crate) static STATE: RefCell<StubState> = RefCell::new(StubState {
            next_handle: 0x100,
            ..StubState::default()
        });
    }

    pub(crate) fn with_state<R>(f: impl FnOnce(&mut StubState) -> R) -> R {
        STATE.with_borrow_mut(f)
    }

    fn fail(state: &mut StubState, code: c_int, message: &str) -> c_int {
        state.last_error = CString::new(message).ok();
        state.last_status = code;
        code
    }

    unsafe extern "C" fn grid_new(out: *mut u64, dim: Index3d, _devices: c_int, _mask: *const u8) -> c_int {
        with_state(|s| {
            s.grid_creates.push(dim);
            s.next_handle += 1;
            *out = s.next_handle;
            0
        })
    }

    unsafe extern "C" fn grid_delete(handle: *mut u64) -> c_int {
        with_state(|s| {
            s.grid_deletes.push(*handle);
            *handle = 0;
            0
        })
    }

    unsafe extern "C" fn grid_is_inside_domain(_grid: u64, index: Index3d) -> c_int {
        c_int::from(index.is_within(Index3d::new(4, 4, 4)))
    }

    unsafe extern "C" fn field_new(out: *mut u64, grid: u64) -> c_int {
        with_state(|s| {
            s.field_creates.push(grid);
            if let Some(code) = s.fail_create {
                return fail(s, code.raw(), "out of device memory");
            }
            s.next_handle += 1;
            *out = s.next_handle;
            0
        })
    }

    unsafe extern "C" fn field_delete(handle: *mut u64) -> c_int {
        with_state(|s| {
            s.field_deletes.push(*handle);
            if let Some(code) = s.fail_delete {
                return fail(s, code.raw(), "field still in use");
            }
            *handle = 0;
            0
        })
    }

    unsafe extern "C" fn field_get_partition(
        _handle: u64,
        out: *mut BlockPartition,
        execution: c_int,
        device: c_int,
        data_view: c_int,
    ) -> c_int {
        if device != 0 {
            return with_state(|s| fail(s, StatusCode::InvalidDevice.raw(), "no such device"));
        }
        (*out).set_idx = device;
        (*out).execution = execution;
        (*out).data_view = data_view;
        (*out).cardinality = 1;
        (*out).num_blocks = 1;
        0
    }

    unsafe extern "C" fn field_partition_size(_partition: *const BlockPartition) -> c_int {
        let delta = with_state(|s| s.partition_size_delta);
        std::mem::size_of::<BlockPartition>() as c_int + delta
    }

    unsafe extern "C" fn field_read(handle: u64, index: Index3d, cardinality: c_int) -> c_int {
        with_state(|s| {
            if cardinality != 0 {
                fail(s, StatusCode::InvalidCardinality.raw(), "single-component field");
                return 0;
            }
            s.last_status = 0;
            s.cells.get(&(handle, index, cardinality)).copied().unwrap_or(0)
        })
    }

    unsafe extern "C" fn field_write(handle: u64, index: Index3d, cardinality: c_int, value: c_int) -> c_int {
        with_state(|s| {
            if let Some(code) = s.fail_write {
                return fail(s, code, "write rejected");
            }
            s.cells.insert((handle, index, cardinality), value);
            0
        })
    }

    unsafe extern "C" fn field_update_host_data(handle: u64, stream: c_int) -> c_int {
        with_state(|s| {
            s.host_updates.push((handle, stream));
            s.update_status
        })
    }

    unsafe extern "C" fn field_update_device_data(handle: u64, stream: c_int) -> c_int {
        with_state(|s| {
            s.device_updates.push((handle, stream));
            s.update_status
        })
    }

    unsafe extern "C" fn last_error() -> *const c_char {
        STATE.with_borrow(|s| s.last_error.as_ref().map_or(ptr::null(), |m| m.as_ptr()))
    }

    unsafe extern "C" fn last_error_code() -> c_int {
        STATE.with_borrow(|s| s.last_status)
    }

    pub(crate) fn entry_points() -> EntryPoints {
        EntryPoints {
            grid: GridEntryPoints {
                new: grid_new,
                delete: grid_delete,
                is_inside_domain: grid_is_inside_domain,
            },
            field: FieldEntryPoints {
                new: field_new,
                delete: field_delete,
                get_partition: field_get_partition,
                partition_size: field_partition_size,
                read: field_read,
                write: field_write,
                update_host_data: field_update_host_data,
                update_device_data: field_update_device_data,
            },
            last_error: Some(last_error),
            last_error_code: Some(last_error_code),
        }
    }

    pub(crate) fn bindings() -> Arc<Bindings> {
        Bindings::from_entry_points("stub", entry_points())
    }
}

#[cfg(test)]
mod tests {
    use super::stub::{self, with_state};
    use super::*;
    use crate::status::{FailureKind, NativeFailure, StatusCode};

    #[test]
    fn test_zero_grid_handle_fails_before_native_call() {
        let bindings = stub::bindings();
        let err = Field::new(&bindings, GridHandle::NULL).unwrap_err();
        assert!(matches!(err, FieldError::InvalidHandle { what: "grid" }));
        assert!(with_state(|s| s.field_creates.is_empty()));
    }

    #[test]
    fn test_one_create_and_one_delete_per_field() {
        let bindings = stub::bindings();
        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        let handle = field.handle();
        assert!(!handle.is_null());
        assert_eq!(with_state(|s| s.field_creates.clone()), vec![0x1]);

        drop(field);
        assert_eq!(with_state(|s| s.field_deletes.clone()), vec![handle.0]);
    }

    #[test]
    fn test_close_then_drop_deletes_once() {
        let bindings = stub::bindings();
        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        field.close().unwrap();
        assert_eq!(with_state(|s| s.field_deletes.len()), 1);
    }

    #[test]
    fn test_round_trip() {
        let bindings = stub::bindings();
        let mut field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        let idx = Index3d::new(0, 0, 0);

        field.write(idx, 0, 42).unwrap();
        assert_eq!(field.read(idx, 0).unwrap(), 42);

        field.write(idx, 0, -7).unwrap();
        assert_eq!(field.read(idx, 0).unwrap(), -7);
        assert_eq!(field.read(Index3d::new(1, 0, 0), 0).unwrap(), 0);
    }

    #[test]
    fn test_failed_read_is_native_call_error() {
        let bindings = stub::bindings();
        let mut field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        field.write(Index3d::ZERO, 0, 11).unwrap();

        let err = field.read(Index3d::ZERO, 7).unwrap_err();
        assert!(matches!(err, FieldError::NativeCall { operation: "read", .. }));
        let failure = err.native_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Known(StatusCode::InvalidCardinality));
        assert_eq!(failure.message.as_deref(), Some("single-component field"));

        // The recorded status does not leak into the next read
        assert_eq!(field.read(Index3d::ZERO, 0).unwrap(), 11);
    }

    #[test]
    fn test_fields_do_not_share_storage() {
        let bindings = stub::bindings();
        let mut a = Field::new(&bindings, GridHandle(0x1)).unwrap();
        let b = Field::new(&bindings, GridHandle(0x1)).unwrap();
        a.write(Index3d::new(1, 2, 3), 0, 5).unwrap();
        assert_eq!(b.read(Index3d::new(1, 2, 3), 0).unwrap(), 0);
    }

    #[test]
    fn test_updates_forward_stream_id() {
        let bindings = stub::bindings();
        let mut field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        let handle = field.handle().0;

        field.update_device_data(StreamId(3)).unwrap();
        field.update_host_data(StreamId(9)).unwrap();

        assert_eq!(with_state(|s| s.device_updates.clone()), vec![(handle, 3)]);
        assert_eq!(with_state(|s| s.host_updates.clone()), vec![(handle, 9)]);
    }

    #[test]
    fn test_update_status_is_returned_unmodified() {
        let bindings = stub::bindings();
        let mut field = Field::new(&bindings, GridHandle(0x1)).unwrap();

        with_state(|s| s.update_status = 1234);
        let err = field.update_host_data(StreamId(0)).unwrap_err();
        let failure = err.native_failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Unknown(1234));

        with_state(|s| s.update_status = StatusCode::InvalidStream.raw());
        let err = field.update_device_data(StreamId(-1)).unwrap_err();
        assert!(matches!(
            err,
            FieldError::NativeCall {
                operation: "update_device_data",
                ..
            }
        ));
        assert_eq!(err.native_failure().unwrap().raw(), StatusCode::InvalidStream.raw());
    }

    #[test]
    fn test_failed_create_is_initialization_error() {
        let bindings = stub::bindings();
        with_state(|s| s.fail_create = Some(StatusCode::LockPoisoned));

        let err = Field::new(&bindings, GridHandle(0x1)).unwrap_err();
        match err {
            FieldError::Initialization { what, failure } => {
                assert_eq!(what, "field");
                assert_eq!(failure.code(), Some(StatusCode::LockPoisoned));
                assert_eq!(failure.message.as_deref(), Some("out of device memory"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was created, so nothing is deleted.
        assert!(with_state(|s| s.field_deletes.is_empty()));
    }

    #[test]
    fn test_failed_delete_surfaces_through_close_only() {
        let bindings = stub::bindings();
        with_state(|s| s.fail_delete = Some(StatusCode::InvalidHandle));

        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        let err = field.close().unwrap_err();
        assert!(matches!(err, FieldError::Teardown { what: "field", .. }));
        // close() already attempted the delete; drop must not retry it.
        assert_eq!(with_state(|s| s.field_deletes.len()), 1);

        // Drop logs instead of panicking.
        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        drop(field);
        assert_eq!(with_state(|s| s.field_deletes.len()), 2);
    }

    #[test]
    fn test_failed_write_carries_native_message() {
        let bindings = stub::bindings();
        let mut field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        with_state(|s| s.fail_write = Some(StatusCode::OutOfDomain.raw()));

        let err = field.write(Index3d::new(99, 0, 0), 0, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "native call `write` failed: index outside the active domain (status 4): write rejected"
        );
    }

    #[test]
    fn test_partition_round_trip() {
        let bindings = stub::bindings();
        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();

        let partition = field
            .partition(Execution::Device, DeviceId(0), DataView::Boundary)
            .unwrap();
        assert_eq!(partition.execution(), Some(Execution::Device));
        assert_eq!(partition.data_view(), Some(DataView::Boundary));
        assert_eq!(partition.num_blocks, 1);

        let err = field
            .partition(Execution::Host, DeviceId(5), DataView::Standard)
            .unwrap_err();
        assert_eq!(
            err.native_failure().and_then(NativeFailure::code),
            Some(StatusCode::InvalidDevice)
        );
    }

    #[test]
    fn test_partition_layout_mismatch() {
        let bindings = stub::bindings();
        let field = Field::new(&bindings, GridHandle(0x1)).unwrap();
        with_state(|s| s.partition_size_delta = 8);

        let err = field
            .partition(Execution::Host, DeviceId(0), DataView::Standard)
            .unwrap_err();
        let local = size_of::<BlockPartition>();
        match err {
            FieldError::LayoutMismatch { native, local: l } => {
                assert_eq!(native, local + 8);
                assert_eq!(l, local);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
