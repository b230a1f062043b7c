//! Block-Sparse Field Bindings
//!
//! Client side of a dynamic-library binding to a native grid/field engine.
//! A native library exports a family of C entry points (`bGrid_new`,
//! `bGrid_bField_read`, ...). This crate resolves them once per library,
//! owns the opaque handles the engine hands out, and forwards typed calls
//! through the boundary.
//!
//! ## Usage
//!
//! ```no_run
//! use bfield_core::{BindingConfig, Bindings, Grid, GridDescriptor, Index3d, StreamId};
//!
//! # fn main() -> bfield_core::Result<()> {
//! let bindings = Bindings::load(&BindingConfig::from_env())?;
//! let grid = Grid::new(&bindings, GridDescriptor::dense(Index3d::new(16, 16, 16), 2))?;
//! let mut field = grid.new_field()?;
//!
//! field.write(Index3d::new(0, 0, 0), 0, 42)?;
//! field.update_device_data(StreamId(0))?;
//! assert_eq!(field.read(Index3d::new(0, 0, 0), 0)?, 42);
//! # Ok(())
//! # }
//! ```
//!
//! Handles are released when the proxies drop; use `close()` to observe a
//! failed release.

pub mod api;
pub mod config;
pub mod error;
pub mod field;
pub mod grid;
pub mod registry;
pub mod status;
pub mod types;

mod handle;

pub use api::{Bindings, EntryPoints, FieldEntryPoints, GridEntryPoints};
pub use config::{BindingConfig, GridKind};
pub use error::{FieldError, Result};
pub use field::Field;
pub use grid::{Grid, GridDescriptor};
pub use status::{FailureKind, NativeFailure, StatusCode};
pub use types::{
    BlockPartition, DataView, DeviceId, Execution, FieldHandle, GridHandle, Index3d, StreamId,
    BLOCK_SIZE, CELLS_PER_BLOCK, MAX_DEVICES,
};

#[cfg(test)]
#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
