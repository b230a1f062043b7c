//! Value types shared by both sides of the call boundary.
//!
//! Everything here is `#[repr(C)]` or a thin newtype over a C scalar, so the
//! same definitions describe what the client sends and what a native engine
//! receives. Enumerations cross the boundary as `c_int` and are validated on
//! the native side with the `TryFrom<c_int>` impls below.

use std::fmt;
use std::os::raw::c_int;

use serde::{Deserialize, Serialize};

/// Edge length of a block in cells. Blocks are cubes of `BLOCK_SIZE³` cells.
pub const BLOCK_SIZE: i32 = 4;

/// Number of cells in one block. Matches the bit width of a block mask.
pub const CELLS_PER_BLOCK: usize = (BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE) as usize;

/// Largest device count a grid may be partitioned across.
///
/// Engines keep per-device bookkeeping, so counts are capped well below what
/// a `c_int` could carry.
pub const MAX_DEVICES: i32 = 1024;

/// Integer coordinate triple identifying a grid cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Index3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Index3d {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Number of cells in a box of this size. Negative extents count as zero.
    #[must_use]
    pub fn volume(&self) -> usize {
        [self.x, self.y, self.z]
            .iter()
            .map(|&v| usize::try_from(v).unwrap_or(0))
            .product()
    }

    /// True when every component is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }

    /// True when `0 <= self < bounds` component-wise.
    #[must_use]
    pub fn is_within(&self, bounds: Index3d) -> bool {
        (0..bounds.x).contains(&self.x)
            && (0..bounds.y).contains(&self.y)
            && (0..bounds.z).contains(&self.z)
    }

    /// Row-major linear offset of this index inside a box of `bounds`.
    /// The caller guarantees `self.is_within(bounds)`.
    ///
    /// Computed in `usize` so boxes with more than `i32::MAX` cells still index
    /// correctly.
    #[must_use]
    pub fn linear(&self, bounds: Index3d) -> usize {
        let (x, y, z) = (self.x as usize, self.y as usize, self.z as usize);
        let (bx, by) = (bounds.x as usize, bounds.y as usize);
        x + bx * (y + by * z)
    }

    /// Coordinates of the block containing this cell.
    #[must_use]
    pub fn block(&self) -> Index3d {
        Index3d::new(
            self.x.div_euclid(BLOCK_SIZE),
            self.y.div_euclid(BLOCK_SIZE),
            self.z.div_euclid(BLOCK_SIZE),
        )
    }

    /// Offset of this cell inside its block, `x + 4y + 16z`.
    #[must_use]
    pub fn in_block(&self) -> usize {
        let x = self.x.rem_euclid(BLOCK_SIZE);
        let y = self.y.rem_euclid(BLOCK_SIZE);
        let z = self.z.rem_euclid(BLOCK_SIZE);
        (x + BLOCK_SIZE * (y + BLOCK_SIZE * z)) as usize
    }
}

impl fmt::Display for Index3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Where an operation runs and which copy of the data it sees.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Execution {
    Device = 0,
    Host = 1,
}

impl TryFrom<c_int> for Execution {
    type Error = c_int;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Device),
            1 => Ok(Self::Host),
            other => Err(other),
        }
    }
}

/// Subset of a partition an operation targets.
///
/// `Internal` blocks have no face neighbour owned by another device,
/// `Boundary` blocks do, and `Standard` is the union of both.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataView {
    #[default]
    Standard = 0,
    Internal = 1,
    Boundary = 2,
}

impl DataView {
    pub const ALL: [DataView; 3] = [DataView::Standard, DataView::Internal, DataView::Boundary];
}

impl TryFrom<c_int> for DataView {
    type Error = c_int;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Standard),
            1 => Ok(Self::Internal),
            2 => Ok(Self::Boundary),
            other => Err(other),
        }
    }
}

/// Index of a device inside the grid's device set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceId(pub i32);

/// Asynchronous queue used for host/device transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StreamId(pub i32);

/// Opaque identifier of a native grid. Zero is never a live grid.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridHandle(pub u64);

impl GridHandle {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GridHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid#{:#x}", self.0)
    }
}

/// Opaque identifier of a native field. Zero is never a live field.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldHandle(pub u64);

impl FieldHandle {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{:#x}", self.0)
    }
}

/// Raw view of one device's slice of a field.
///
/// Filled in by the native get-partition call. Pointers reference memory owned
/// by the native field and stay valid until the field is deleted or its
/// buffers are synchronised again.
///
/// Value of component `c` of cell `k` (in-block offset) of local block `b`
/// lives at `mem[cell_offset(b, c, k)]`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BlockPartition {
    /// First value of the partition's first block.
    pub mem: *mut i32,
    /// Origin (cell coordinates) of each block, `num_blocks` entries.
    pub origins: *const Index3d,
    /// Activity bit-mask of each block, `num_blocks` entries.
    pub masks: *const u64,
    pub domain_size: Index3d,
    pub set_idx: c_int,
    pub cardinality: c_int,
    pub block_size: c_int,
    pub data_view: c_int,
    pub execution: c_int,
    /// Index of the first block relative to the device's STANDARD range.
    pub first_block: u32,
    pub num_blocks: u32,
}

impl Default for BlockPartition {
    fn default() -> Self {
        Self {
            mem: std::ptr::null_mut(),
            origins: std::ptr::null(),
            masks: std::ptr::null(),
            domain_size: Index3d::ZERO,
            set_idx: 0,
            cardinality: 0,
            block_size: BLOCK_SIZE,
            data_view: DataView::Standard as c_int,
            execution: Execution::Host as c_int,
            first_block: 0,
            num_blocks: 0,
        }
    }
}

impl BlockPartition {
    /// Offset of a value relative to `mem`.
    #[must_use]
    pub fn cell_offset(&self, block: usize, component: usize, cell: usize) -> usize {
        (block * self.cardinality as usize + component) * CELLS_PER_BLOCK + cell
    }

    /// Number of values addressable through `mem`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_blocks as usize * self.cardinality as usize * CELLS_PER_BLOCK
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_blocks == 0
    }

    /// Whether cell `cell` of local block `block` is active.
    ///
    /// # Safety
    /// `masks` must point at `num_blocks` valid entries and `block < num_blocks`.
    #[must_use]
    pub unsafe fn is_active(&self, block: usize, cell: usize) -> bool {
        (*self.masks.add(block) >> cell) & 1 == 1
    }

    /// Reads one value through the raw memory pointer.
    ///
    /// # Safety
    /// The partition must come from a live field and the offset must be in
    /// `0..self.len()`.
    #[must_use]
    pub unsafe fn value(&self, block: usize, component: usize, cell: usize) -> i32 {
        *self.mem.add(self.cell_offset(block, component, cell))
    }

    /// Data view as a typed value, if the discriminant is known.
    #[must_use]
    pub fn data_view(&self) -> Option<DataView> {
        DataView::try_from(self.data_view).ok()
    }

    /// Execution target as a typed value, if the discriminant is known.
    #[must_use]
    pub fn execution(&self) -> Option<Execution> {
        Execution::try_from(self.execution).ok()
    }
}
