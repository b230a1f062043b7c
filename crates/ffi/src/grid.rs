//! Grid entry points.

use std::os::raw::c_int;
use std::slice;

use bfield_core::{Index3d, StatusCode};
use tracing::debug;

use crate::engine::BlockGrid;
use crate::error::DefaultNativeError;
use crate::handles;
use crate::helpers::{track_error, track_result, track_status};

/// Creates a block grid and returns its handle via out-parameter.
///
/// # Parameters
/// - `out_grid`: receives the new handle; set to 0 on failure
/// - `dim`: domain size in cells, all components positive
/// - `num_devices`: number of devices to partition blocks across, in `1..=MAX_DEVICES`
/// - `active_mask`: one byte per cell (x fastest), non-zero = active; null = all active
///
/// # Returns
/// - `Ok` (0) on success
/// - `NullPointer` if `out_grid` is null
/// - `InvalidParameter` if dimensions or device count are invalid
///
/// # Safety
/// `out_grid` must be null or writable. A non-null `active_mask` must point at
/// `dim.x * dim.y * dim.z` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn bGrid_new(
    out_grid: *mut u64,
    dim: Index3d,
    num_devices: c_int,
    active_mask: *const u8,
) -> c_int {
    if out_grid.is_null() {
        return track_error(&DefaultNativeError::null_pointer("out_grid"));
    }
    *out_grid = 0;

    let Ok(devices) = usize::try_from(num_devices) else {
        return track_error(&DefaultNativeError::invalid_parameter(format!(
            "Device count must be non-negative, got {num_devices}"
        )));
    };
    let mask = (!active_mask.is_null()).then(|| slice::from_raw_parts(active_mask, dim.volume()));

    match track_result(BlockGrid::new(dim, devices, mask).and_then(handles::insert_grid)) {
        Ok(handle) => {
            debug!("bGrid_new {dim} over {devices} device(s) -> {handle:#x}");
            *out_grid = handle;
            StatusCode::Ok.raw()
        }
        Err(code) => code,
    }
}

/// Deletes a grid. Fields created over it stay usable until they are deleted.
///
/// # Returns
/// - `Ok` (0) on success, with `*grid` set to 0
/// - `NullPointer` if `grid` is null
/// - `InvalidHandle` if `*grid` is not a live grid
///
/// # Safety
/// `grid` must be null or point at a readable and writable handle.
#[no_mangle]
pub unsafe extern "C" fn bGrid_delete(grid: *mut u64) -> c_int {
    if grid.is_null() {
        return track_error(&DefaultNativeError::null_pointer("grid"));
    }
    let status = track_status(handles::remove_grid(*grid));
    if status == StatusCode::Ok.raw() {
        debug!("bGrid_delete {:#x}", *grid);
        *grid = 0;
    }
    status
}

/// Whether `index` is an active cell of `grid`.
///
/// # Returns
/// 1 if active, 0 if not, the negated status code on error.
#[no_mangle]
pub extern "C" fn bGrid_is_inside_domain(grid: u64, index: Index3d) -> c_int {
    match track_result(handles::grid(grid)) {
        Ok(grid) => c_int::from(grid.is_active(index)),
        Err(code) => -code,
    }
}
