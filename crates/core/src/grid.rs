//! Client-side proxy for a native grid.

use std::os::raw::c_int;
use std::ptr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::Bindings;
use crate::error::{FieldError, Result};
use crate::field::Field;
use crate::handle::OwnedHandle;
use crate::types::{GridHandle, Index3d, MAX_DEVICES};

/// Shape of a grid to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDescriptor {
    /// Domain size in cells.
    pub dim: Index3d,
    /// Number of devices the grid is partitioned across.
    pub num_devices: i32,
    /// Per-cell activity, x fastest then y then z. `None` means every cell is active.
    pub active: Option<Vec<bool>>,
}

impl GridDescriptor {
    /// Every cell of `dim` active.
    #[must_use]
    pub fn dense(dim: Index3d, num_devices: i32) -> Self {
        Self {
            dim,
            num_devices,
            active: None,
        }
    }

    /// Cells where `is_active` returns true are active.
    #[must_use]
    pub fn sparse(dim: Index3d, num_devices: i32, is_active: impl Fn(Index3d) -> bool) -> Self {
        let mut active = Vec::with_capacity(dim.volume());
        for z in 0..dim.z {
            for y in 0..dim.y {
                for x in 0..dim.x {
                    active.push(is_active(Index3d::new(x, y, z)));
                }
            }
        }
        Self {
            dim,
            num_devices,
            active: Some(active),
        }
    }

    /// Number of active cells.
    #[must_use]
    pub fn active_cells(&self) -> usize {
        self.active
            .as_ref()
            .map_or(self.dim.volume(), |mask| mask.iter().filter(|&&a| a).count())
    }

    /// Whether `index` is inside the domain and active.
    #[must_use]
    pub fn is_active(&self, index: Index3d) -> bool {
        index.is_within(self.dim)
            && self
                .active
                .as_ref()
                .is_none_or(|mask| mask[index.linear(self.dim)])
    }

    /// Checks the descriptor before anything is sent to the engine.
    pub fn validate(&self) -> Result<()> {
        if !self.dim.is_positive() {
            return Err(FieldError::InvalidDescriptor(format!(
                "dimensions must be positive, got {}",
                self.dim
            )));
        }
        if self.num_devices < 1 {
            return Err(FieldError::InvalidDescriptor(format!(
                "at least one device required, got {}",
                self.num_devices
            )));
        }
        if self.num_devices > MAX_DEVICES {
            return Err(FieldError::InvalidDescriptor(format!(
                "at most {MAX_DEVICES} devices supported, got {}",
                self.num_devices
            )));
        }
        if let Some(mask) = &self.active {
            if mask.len() != self.dim.volume() {
                return Err(FieldError::InvalidDescriptor(format!(
                    "activity mask has {} entries, domain has {} cells",
                    mask.len(),
                    self.dim.volume()
                )));
            }
        }
        Ok(())
    }
}

/// A native grid.
///
/// Owns the grid handle; fields created over it only keep a copy of the
/// handle value.
#[derive(Debug)]
pub struct Grid {
    bindings: Arc<Bindings>,
    descriptor: GridDescriptor,
    handle: OwnedHandle,
}

impl Grid {
    pub fn new(bindings: &Arc<Bindings>, descriptor: GridDescriptor) -> Result<Self> {
        descriptor.validate()?;

        let new = bindings.grid().new;
        let mask = descriptor
            .active
            .as_ref()
            .map_or(ptr::null(), |mask| mask.as_ptr().cast::<u8>());
        // SAFETY: `bool` is one byte holding 0 or 1 and the mask length was
        // validated against the domain size.
        let handle = OwnedHandle::create("grid", bindings, |out| unsafe {
            new(out, descriptor.dim, descriptor.num_devices, mask)
        })?;

        Ok(Self {
            bindings: Arc::clone(bindings),
            descriptor,
            handle,
        })
    }

    #[must_use]
    pub fn handle(&self) -> GridHandle {
        GridHandle(self.handle.raw())
    }

    #[must_use]
    pub fn descriptor(&self) -> &GridDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn bindings(&self) -> &Arc<Bindings> {
        &self.bindings
    }

    /// Asks the engine whether `index` is an active cell.
    pub fn is_inside_domain(&self, index: Index3d) -> Result<bool> {
        let handle = self.handle.get()?;
        // SAFETY: `handle` is live for the lifetime of `self`.
        let answer: c_int = unsafe { (self.bindings.grid().is_inside_domain)(handle, index) };
        if answer < 0 {
            self.bindings
                .check(answer.saturating_neg())
                .map_err(|failure| FieldError::NativeCall {
                    operation: "is_inside_domain",
                    failure,
                })?;
        }
        Ok(answer == 1)
    }

    /// Creates a field over this grid.
    pub fn new_field(&self) -> Result<Field> {
        Field::new(&self.bindings, self.handle())
    }

    /// Deletes the native grid, reporting a failed deletion.
    pub fn close(mut self) -> Result<()> {
        let delete = self.bindings.grid().delete;
        self.handle.release(&self.bindings, delete)
    }
}

impl Drop for Grid {
    fn drop(&mut self) {
        let delete = self.bindings.grid().delete;
        if let Err(e) = self.handle.release(&self.bindings, delete) {
            error!("Failed to release grid {}: {e}", self.descriptor.dim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::stub::{self, with_state};

    #[test]
    fn test_descriptor_validation() {
        assert!(GridDescriptor::dense(Index3d::new(4, 4, 4), 1).validate().is_ok());

        let err = GridDescriptor::dense(Index3d::new(0, 4, 4), 1).validate().unwrap_err();
        assert!(matches!(err, FieldError::InvalidDescriptor(_)));

        let err = GridDescriptor::dense(Index3d::new(4, 4, 4), 0).validate().unwrap_err();
        assert!(err.to_string().contains("at least one device"));

        assert!(GridDescriptor::dense(Index3d::new(4, 4, 4), MAX_DEVICES).validate().is_ok());
        let err = GridDescriptor::dense(Index3d::new(4, 4, 4), i32::MAX).validate().unwrap_err();
        assert!(err.to_string().contains("at most 1024 devices"));

        let mut sparse = GridDescriptor::sparse(Index3d::new(2, 2, 2), 1, |_| true);
        sparse.active.as_mut().unwrap().pop();
        assert!(sparse.validate().is_err());
    }

    #[test]
    fn test_sparse_descriptor() {
        let dim = Index3d::new(4, 3, 2);
        let descriptor = GridDescriptor::sparse(dim, 2, |idx| idx.x == idx.y);
        assert_eq!(descriptor.active_cells(), 3 * 2);
        assert!(descriptor.is_active(Index3d::new(2, 2, 1)));
        assert!(!descriptor.is_active(Index3d::new(2, 1, 1)));
        assert!(!descriptor.is_active(Index3d::new(5, 5, 0)));
        assert_eq!(GridDescriptor::dense(dim, 1).active_cells(), 24);
    }

    #[test]
    fn test_invalid_descriptor_makes_no_native_call() {
        let bindings = stub::bindings();
        let result = Grid::new(&bindings, GridDescriptor::dense(Index3d::new(4, -1, 4), 1));
        assert!(result.is_err());
        assert!(with_state(|s| s.grid_creates.is_empty()));
    }

    #[test]
    fn test_grid_lifecycle_and_fields() {
        let bindings = stub::bindings();
        let dim = Index3d::new(4, 4, 4);
        let grid = Grid::new(&bindings, GridDescriptor::dense(dim, 1)).unwrap();
        let handle = grid.handle();
        assert_eq!(with_state(|s| s.grid_creates.clone()), vec![dim]);

        let field = grid.new_field().unwrap();
        assert_eq!(field.grid(), handle);
        assert_eq!(with_state(|s| s.field_creates.clone()), vec![handle.0]);

        assert!(grid.is_inside_domain(Index3d::new(3, 3, 3)).unwrap());
        assert!(!grid.is_inside_domain(Index3d::new(4, 0, 0)).unwrap());

        drop(field);
        grid.close().unwrap();
        assert_eq!(with_state(|s| s.grid_deletes.clone()), vec![handle.0]);
    }
}
