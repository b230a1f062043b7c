//! Field entry points.
//!
//! Every call looks the field up by handle, so a deleted handle is answered
//! with `InvalidHandle` rather than touching freed storage.

use std::mem;
use std::os::raw::c_int;

use bfield_core::{BlockPartition, DataView, Execution, Index3d, StatusCode};
use tracing::{debug, trace};

use crate::engine::{BlockField, OUTSIDE_VALUE};
use crate::error::DefaultNativeError;
use crate::handles;
use crate::helpers::{clear_last_error, set_last_error, track_error, track_result, track_status};

/// Components per cell of fields created through this interface.
pub const FIELD_CARDINALITY: usize = 1;

/// Creates an integer field over `grid` and returns its handle via out-parameter.
///
/// # Returns
/// - `Ok` (0) on success
/// - `NullPointer` if `out_field` is null
/// - `InvalidHandle` if `grid` is not a live grid
///
/// # Safety
/// `out_field` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn bGrid_bField_new(out_field: *mut u64, grid: u64) -> c_int {
    if out_field.is_null() {
        return track_error(&DefaultNativeError::null_pointer("out_field"));
    }
    *out_field = 0;

    let created = handles::grid(grid)
        .map(|grid| BlockField::new(grid, FIELD_CARDINALITY))
        .and_then(handles::insert_field);
    match track_result(created) {
        Ok(handle) => {
            debug!("bGrid_bField_new over grid {grid:#x} -> {handle:#x}");
            *out_field = handle;
            StatusCode::Ok.raw()
        }
        Err(code) => code,
    }
}

/// Deletes a field and releases its host and device storage.
///
/// # Returns
/// - `Ok` (0) on success, with `*field` set to 0
/// - `NullPointer` if `field` is null
/// - `InvalidHandle` if `*field` is not a live field
///
/// # Safety
/// `field` must be null or point at a readable and writable handle.
#[no_mangle]
pub unsafe extern "C" fn bGrid_bField_delete(field: *mut u64) -> c_int {
    if field.is_null() {
        return track_error(&DefaultNativeError::null_pointer("field"));
    }
    let status = track_status(handles::remove_field(*field));
    if status == StatusCode::Ok.raw() {
        debug!("bGrid_bField_delete {:#x}", *field);
        *field = 0;
    }
    status
}

/// Fills `out_partition` with the raw layout of one device's slice.
///
/// # Parameters
/// - `execution`: 0 = device buffer, 1 = host buffer
/// - `device`: device index in `0..num_devices`
/// - `data_view`: 0 = standard, 1 = internal, 2 = boundary
///
/// # Returns
/// - `Ok` (0) on success
/// - `NullPointer` if `out_partition` is null
/// - `InvalidParameter` for an unknown execution or data view
/// - `InvalidDevice` if `device` is out of range
///
/// # Safety
/// `out_partition` must be null or writable. The pointers written into it
/// stay valid until the field is deleted.
#[no_mangle]
pub unsafe extern "C" fn bGrid_bField_get_partition(
    field: u64,
    out_partition: *mut BlockPartition,
    execution: c_int,
    device: c_int,
    data_view: c_int,
) -> c_int {
    if out_partition.is_null() {
        return track_error(&DefaultNativeError::null_pointer("out_partition"));
    }
    let Ok(execution) = Execution::try_from(execution) else {
        return track_error(&DefaultNativeError::invalid_parameter(format!(
            "Unknown execution {execution}"
        )));
    };
    let Ok(view) = DataView::try_from(data_view) else {
        return track_error(&DefaultNativeError::invalid_parameter(format!(
            "Unknown data view {data_view}"
        )));
    };

    let partition = handles::field(field).and_then(|f| f.partition(execution, device, view));
    match track_result(partition) {
        Ok(partition) => {
            trace!(
                "bGrid_bField_get_partition {field:#x} device {device} {view:?}: {} block(s)",
                partition.num_blocks
            );
            *out_partition = partition;
            StatusCode::Ok.raw()
        }
        Err(code) => code,
    }
}

/// Size in bytes of the partition descriptor this library writes.
///
/// Callers compare it with their own layout before trusting
/// `bGrid_bField_get_partition`.
#[no_mangle]
pub extern "C" fn bGrid_bField_partition_size(_partition: *const BlockPartition) -> c_int {
    mem::size_of::<BlockPartition>() as c_int
}

/// Reads one component of the host copy at `index`.
///
/// # Returns
/// The stored value; 0 for cells outside the active domain. On error 0 is
/// returned as well and the failure is left in `bGrid_get_last_error` and
/// `bGrid_get_last_error_code`; a successful read resets the code to `Ok`.
#[no_mangle]
pub extern "C" fn bGrid_bField_read(field: u64, index: Index3d, component: c_int) -> c_int {
    match handles::field(field).and_then(|f| f.read(index, component)) {
        Ok(value) => {
            clear_last_error();
            value
        }
        Err(e) => {
            set_last_error(&e);
            OUTSIDE_VALUE
        }
    }
}

/// Writes one component of the host copy at `index`.
///
/// # Returns
/// - `Ok` (0) on success
/// - `InvalidHandle`, `OutOfDomain` or `InvalidCardinality` on failure
#[no_mangle]
pub extern "C" fn bGrid_bField_write(
    field: u64,
    index: Index3d,
    component: c_int,
    value: c_int,
) -> c_int {
    track_status(handles::field(field).and_then(|f| f.write(index, component, value)))
}

/// Copies device data back to the host on `stream`.
#[no_mangle]
pub extern "C" fn bGrid_bField_update_host_data(field: u64, stream: c_int) -> c_int {
    track_status(handles::field(field).and_then(|f| f.update_host_data(stream)))
}

/// Copies host data out to every device on `stream`.
#[no_mangle]
pub extern "C" fn bGrid_bField_update_device_data(field: u64, stream: c_int) -> c_int {
    track_status(handles::field(field).and_then(|f| f.update_device_data(stream)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{bGrid_delete, bGrid_new};

    fn grid(dim: Index3d, devices: c_int) -> u64 {
        let mut handle = 0;
        let status = unsafe { bGrid_new(&mut handle, dim, devices, std::ptr::null()) };
        assert_eq!(status, 0);
        handle
    }

    #[test]
    fn test_field_lifecycle() {
        let mut g = grid(Index3d::new(8, 8, 8), 2);
        let mut f = 0;
        assert_eq!(unsafe { bGrid_bField_new(&mut f, g) }, 0);
        assert!(handles::is_live_field(f));

        assert_eq!(bGrid_bField_write(f, Index3d::new(1, 2, 3), 0, 42), 0);
        assert_eq!(bGrid_bField_read(f, Index3d::new(1, 2, 3), 0), 42);

        let stale = f;
        assert_eq!(unsafe { bGrid_bField_delete(&mut f) }, 0);
        assert_eq!(f, 0);
        assert!(!handles::is_live_field(stale));
        assert_eq!(
            bGrid_bField_write(stale, Index3d::ZERO, 0, 1),
            StatusCode::InvalidHandle.raw()
        );
        assert_eq!(unsafe { bGrid_delete(&mut g) }, 0);
    }

    #[test]
    fn test_field_over_unknown_grid() {
        let mut f = 7;
        let status = unsafe { bGrid_bField_new(&mut f, u64::MAX) };
        assert_eq!(status, StatusCode::InvalidHandle.raw());
        assert_eq!(f, 0);
        assert_eq!(
            unsafe { bGrid_bField_new(std::ptr::null_mut(), 1) },
            StatusCode::NullPointer.raw()
        );
    }

    #[test]
    fn test_get_partition_rejects_bad_enums() {
        let g = grid(Index3d::new(4, 4, 4), 1);
        let mut f = 0;
        assert_eq!(unsafe { bGrid_bField_new(&mut f, g) }, 0);

        let mut partition = BlockPartition::default();
        let bad_view = unsafe { bGrid_bField_get_partition(f, &mut partition, 1, 0, 9) };
        assert_eq!(bad_view, StatusCode::InvalidParameter.raw());
        let bad_exec = unsafe { bGrid_bField_get_partition(f, &mut partition, -1, 0, 0) };
        assert_eq!(bad_exec, StatusCode::InvalidParameter.raw());
        let bad_device = unsafe { bGrid_bField_get_partition(f, &mut partition, 1, 3, 0) };
        assert_eq!(bad_device, StatusCode::InvalidDevice.raw());

        assert_eq!(unsafe { bGrid_bField_get_partition(f, &mut partition, 1, 0, 0) }, 0);
        assert_eq!(partition.num_blocks, 1);
        assert_eq!(
            bGrid_bField_partition_size(&partition),
            mem::size_of::<BlockPartition>() as c_int
        );
    }
}
