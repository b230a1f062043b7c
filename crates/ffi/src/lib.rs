//! C ABI for the block-sparse field engine.
//!
//! Exposes grids and integer fields behind opaque `u64` handles. Every call
//! returns a raw [`StatusCode`](bfield_core::StatusCode) (except `read`, which
//! returns the value) and leaves a message in [`bGrid_get_last_error`] when it
//! fails. Device memory is kept in host RAM, one buffer per device.
//!
//! The crate builds as a `cdylib` for dynamic loading through
//! [`bfield_core::Bindings::load`], and as an `rlib` so Rust callers can bind
//! statically with [`entry_points`].
#![allow(non_snake_case)]

pub mod engine;
pub mod error;
pub mod field;
pub mod grid;
pub mod handles;
mod helpers;

pub use error::{bGrid_get_last_error, bGrid_get_last_error_code, DefaultNativeError, NativeError};
pub use field::{
    bGrid_bField_delete, bGrid_bField_get_partition, bGrid_bField_new, bGrid_bField_partition_size,
    bGrid_bField_read, bGrid_bField_update_device_data, bGrid_bField_update_host_data,
    bGrid_bField_write, FIELD_CARDINALITY,
};
pub use grid::{bGrid_delete, bGrid_is_inside_domain, bGrid_new};

use bfield_core::{EntryPoints, FieldEntryPoints, GridEntryPoints};

/// Entry points of this library, bound without going through a shared object.
pub fn entry_points() -> EntryPoints {
    EntryPoints {
        grid: GridEntryPoints {
            new: bGrid_new,
            delete: bGrid_delete,
            is_inside_domain: bGrid_is_inside_domain,
        },
        field: FieldEntryPoints {
            new: bGrid_bField_new,
            delete: bGrid_bField_delete,
            get_partition: bGrid_bField_get_partition,
            partition_size: bGrid_bField_partition_size,
            read: bGrid_bField_read,
            write: bGrid_bField_write,
            update_host_data: bGrid_bField_update_host_data,
            update_device_data: bGrid_bField_update_device_data,
        },
        last_error: Some(bGrid_get_last_error),
        last_error_code: Some(bGrid_get_last_error_code),
    }
}
