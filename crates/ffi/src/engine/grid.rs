//! Block-sparse grid layout.
//!
//! The domain is tiled with 4×4×4 blocks. Only blocks holding at least one
//! active cell are allocated; each carries a 64-bit activity mask with bit
//! `x + 4y + 16z` set for active in-block cells.
//!
//! Allocated blocks are sorted by origin (z, then y, then x) and split into
//! contiguous ranges, one per device, whose sizes differ by at most one.
//! Inside a device range blocks are reordered so that INTERNAL blocks (no face
//! neighbour on another device) come first and BOUNDARY blocks follow. A
//! STANDARD view therefore is a single contiguous range, and so are the two
//! sub-views.

use std::ops::Range;

use bfield_core::{DataView, Index3d, BLOCK_SIZE, MAX_DEVICES};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::DefaultNativeError;

const FACE_NEIGHBOURS: [Index3d; 6] = [
    Index3d::new(-1, 0, 0),
    Index3d::new(1, 0, 0),
    Index3d::new(0, -1, 0),
    Index3d::new(0, 1, 0),
    Index3d::new(0, 0, -1),
    Index3d::new(0, 0, 1),
];

/// One device's range of blocks, in global block indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevicePartition {
    pub first: usize,
    pub internal: usize,
    pub boundary: usize,
}

impl DevicePartition {
    /// Number of blocks owned by the device.
    pub fn len(&self) -> usize {
        self.internal + self.boundary
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global block range covered by `view`.
    pub fn range(&self, view: DataView) -> Range<usize> {
        let split = self.first + self.internal;
        match view {
            DataView::Standard => self.first..split + self.boundary,
            DataView::Internal => self.first..split,
            DataView::Boundary => split..split + self.boundary,
        }
    }
}

/// Immutable block layout shared by every field of a grid.
#[derive(Debug)]
pub struct BlockGrid {
    dim: Index3d,
    origins: Vec<Index3d>,
    masks: Vec<u64>,
    lookup: FxHashMap<Index3d, usize>,
    partitions: Vec<DevicePartition>,
}

impl BlockGrid {
    /// Builds the layout for `dim` split across `num_devices`.
    ///
    /// `active` holds one byte per cell (x fastest), non-zero meaning active;
    /// `None` activates every cell. `num_devices` must lie in `1..=MAX_DEVICES`.
    pub fn new(
        dim: Index3d,
        num_devices: usize,
        active: Option<&[u8]>,
    ) -> Result<Self, DefaultNativeError> {
        if !dim.is_positive() {
            return Err(DefaultNativeError::invalid_parameter(format!(
                "Grid dimensions must be positive, got {dim}"
            )));
        }
        if num_devices == 0 {
            return Err(DefaultNativeError::invalid_parameter(
                "Grid needs at least one device".to_string(),
            ));
        }
        if num_devices > MAX_DEVICES as usize {
            return Err(DefaultNativeError::invalid_parameter(format!(
                "Grid supports at most {MAX_DEVICES} devices, got {num_devices}"
            )));
        }
        if let Some(mask) = active {
            if mask.len() != dim.volume() {
                return Err(DefaultNativeError::invalid_parameter(format!(
                    "Activity mask has {} entries, domain has {} cells",
                    mask.len(),
                    dim.volume()
                )));
            }
        }

        let mut block_masks: FxHashMap<Index3d, u64> = FxHashMap::default();
        for z in 0..dim.z {
            for y in 0..dim.y {
                for x in 0..dim.x {
                    let cell = Index3d::new(x, y, z);
                    if active.is_some_and(|mask| mask[cell.linear(dim)] == 0) {
                        continue;
                    }
                    *block_masks.entry(cell.block()).or_insert(0) |= 1u64 << cell.in_block();
                }
            }
        }

        let mut blocks: Vec<Index3d> = block_masks.keys().copied().collect();
        blocks.sort_unstable_by_key(|b| (b.z, b.y, b.x));

        let total = blocks.len();
        let (base, extra) = (total / num_devices, total % num_devices);
        let mut owner: FxHashMap<Index3d, usize> = FxHashMap::default();
        let mut ranges = Vec::with_capacity(num_devices);
        let mut start = 0;
        for device in 0..num_devices {
            let len = base + usize::from(device < extra);
            for block in &blocks[start..start + len] {
                owner.insert(*block, device);
            }
            ranges.push(start..start + len);
            start += len;
        }

        let mut ordered = Vec::with_capacity(total);
        let mut partitions = Vec::with_capacity(num_devices);
        for (device, range) in ranges.into_iter().enumerate() {
            let (boundary, internal): (Vec<Index3d>, Vec<Index3d>) =
                blocks[range].iter().copied().partition(|block| {
                    FACE_NEIGHBOURS.iter().any(|offset| {
                        let neighbour = Index3d::new(
                            block.x + offset.x,
                            block.y + offset.y,
                            block.z + offset.z,
                        );
                        owner.get(&neighbour).is_some_and(|&d| d != device)
                    })
                });
            partitions.push(DevicePartition {
                first: ordered.len(),
                internal: internal.len(),
                boundary: boundary.len(),
            });
            ordered.extend(internal);
            ordered.extend(boundary);
        }

        let origins = ordered
            .iter()
            .map(|b| Index3d::new(b.x * BLOCK_SIZE, b.y * BLOCK_SIZE, b.z * BLOCK_SIZE))
            .collect();
        let masks = ordered.iter().map(|b| block_masks[b]).collect();
        let lookup = ordered
            .iter()
            .enumerate()
            .map(|(i, b)| (*b, i))
            .collect();

        debug!(
            "Built block grid {dim}: {total} blocks over {num_devices} device(s)"
        );

        Ok(Self {
            dim,
            origins,
            masks,
            lookup,
            partitions,
        })
    }

    pub fn dim(&self) -> Index3d {
        self.dim
    }

    pub fn num_blocks(&self) -> usize {
        self.origins.len()
    }

    pub fn num_devices(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[DevicePartition] {
        &self.partitions
    }

    pub fn partition(&self, device: usize) -> Option<&DevicePartition> {
        self.partitions.get(device)
    }

    pub fn origins(&self) -> &[Index3d] {
        &self.origins
    }

    pub fn masks(&self) -> &[u64] {
        &self.masks
    }

    /// Global block index and in-block offset of an active cell.
    pub fn locate(&self, index: Index3d) -> Option<(usize, usize)> {
        if !index.is_within(self.dim) {
            return None;
        }
        let block = *self.lookup.get(&index.block())?;
        let cell = index.in_block();
        ((self.masks[block] >> cell) & 1 == 1).then_some((block, cell))
    }

    pub fn is_active(&self, index: Index3d) -> bool {
        self.locate(index).is_some()
    }

    /// Number of active cells.
    pub fn active_cells(&self) -> usize {
        self.masks.iter().map(|m| m.count_ones() as usize).sum()
    }
}
