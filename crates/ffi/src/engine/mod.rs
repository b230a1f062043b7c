//! In-memory block-sparse engine behind the C entry points.

pub mod field;
pub mod grid;

pub use field::{BlockField, OUTSIDE_VALUE};
pub use grid::{BlockGrid, DevicePartition};
