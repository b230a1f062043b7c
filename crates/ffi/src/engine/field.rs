//! Field storage over a block grid.
//!
//! A field keeps one host buffer covering every block and one buffer per
//! device covering that device's blocks. Reads and writes go to the host
//! buffer; the two update calls copy whole buffers in one direction.
//!
//! Value of component `c` of in-block cell `k` of block `b` sits at
//! `(b * cardinality + c) * 64 + k`.

use std::os::raw::c_int;
use std::sync::{Arc, RwLock};

use bfield_core::{BlockPartition, DataView, Execution, Index3d, BLOCK_SIZE, CELLS_PER_BLOCK};
use rayon::prelude::*;
use tracing::debug;

use crate::engine::grid::BlockGrid;
use crate::error::DefaultNativeError;

/// Value returned for cells outside the active domain.
pub const OUTSIDE_VALUE: i32 = 0;

#[derive(Debug)]
struct FieldBuffers {
    host: Vec<i32>,
    devices: Vec<Vec<i32>>,
}

/// Host and device storage for one field.
#[derive(Debug)]
pub struct BlockField {
    grid: Arc<BlockGrid>,
    cardinality: usize,
    buffers: RwLock<FieldBuffers>,
}

impl BlockField {
    pub fn new(grid: Arc<BlockGrid>, cardinality: usize) -> Self {
        let stride = cardinality * CELLS_PER_BLOCK;
        let host = vec![OUTSIDE_VALUE; grid.num_blocks() * stride];
        let devices = grid
            .partitions()
            .iter()
            .map(|p| vec![OUTSIDE_VALUE; p.len() * stride])
            .collect();

        Self {
            grid,
            cardinality,
            buffers: RwLock::new(FieldBuffers { host, devices }),
        }
    }

    pub fn grid(&self) -> &Arc<BlockGrid> {
        &self.grid
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn stride(&self) -> usize {
        self.cardinality * CELLS_PER_BLOCK
    }

    fn component(&self, component: c_int) -> Result<usize, DefaultNativeError> {
        usize::try_from(component)
            .ok()
            .filter(|&c| c < self.cardinality)
            .ok_or_else(|| DefaultNativeError::invalid_cardinality(component, self.cardinality))
    }

    fn offset(&self, block: usize, component: usize, cell: usize) -> usize {
        (block * self.cardinality + component) * CELLS_PER_BLOCK + cell
    }

    /// Host value at `index`; [`OUTSIDE_VALUE`] for inactive cells.
    pub fn read(&self, index: Index3d, component: c_int) -> Result<i32, DefaultNativeError> {
        let component = self.component(component)?;
        let Some((block, cell)) = self.grid.locate(index) else {
            return Ok(OUTSIDE_VALUE);
        };
        let buffers = self
            .buffers
            .read()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        Ok(buffers.host[self.offset(block, component, cell)])
    }

    pub fn write(&self, index: Index3d, component: c_int, value: i32) -> Result<(), DefaultNativeError> {
        let component = self.component(component)?;
        let (block, cell) = self
            .grid
            .locate(index)
            .ok_or_else(|| DefaultNativeError::out_of_domain(index, self.grid.dim()))?;
        let offset = self.offset(block, component, cell);
        let mut buffers = self
            .buffers
            .write()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        buffers.host[offset] = value;
        Ok(())
    }

    /// Copies every device buffer back into the host buffer.
    pub fn update_host_data(&self, stream: c_int) -> Result<(), DefaultNativeError> {
        if stream < 0 {
            return Err(DefaultNativeError::invalid_stream(stream));
        }
        let mut buffers = self
            .buffers
            .write()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        let FieldBuffers { host, devices } = &mut *buffers;

        // Device ranges are contiguous and in device order, so the host buffer
        // splits into one destination slice per device.
        let mut rest = host.as_mut_slice();
        let mut targets = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(device.len());
            targets.push(head);
            rest = tail;
        }
        targets
            .into_par_iter()
            .zip(devices.par_iter())
            .for_each(|(dst, src)| dst.copy_from_slice(src));

        debug!("Field host data updated on stream {stream}");
        Ok(())
    }

    /// Copies the host buffer into every device buffer.
    pub fn update_device_data(&self, stream: c_int) -> Result<(), DefaultNativeError> {
        if stream < 0 {
            return Err(DefaultNativeError::invalid_stream(stream));
        }
        let stride = self.stride();
        let mut buffers = self
            .buffers
            .write()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        let FieldBuffers { host, devices } = &mut *buffers;
        let host: &[i32] = host;

        devices
            .par_iter_mut()
            .zip(self.grid.partitions().par_iter())
            .for_each(|(dst, partition)| {
                let start = partition.first * stride;
                let len = dst.len();
                dst.copy_from_slice(&host[start..start + len]);
            });

        debug!("Field device data updated on stream {stream}");
        Ok(())
    }

    /// Raw descriptor of one device's slice for `execution` and `view`.
    pub fn partition(
        &self,
        execution: Execution,
        device: c_int,
        view: DataView,
    ) -> Result<BlockPartition, DefaultNativeError> {
        let device_idx = usize::try_from(device)
            .ok()
            .filter(|&d| d < self.grid.num_devices())
            .ok_or_else(|| DefaultNativeError::invalid_device(device, self.grid.num_devices()))?;
        let partition = self.grid.partitions()[device_idx];
        let range = partition.range(view);
        let local_first = range.start - partition.first;
        let stride = self.stride();

        let mut buffers = self
            .buffers
            .write()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        // Buffers never reallocate after construction, so the pointer stays
        // valid for the field's lifetime.
        let mem = match execution {
            Execution::Host => buffers.host[range.start * stride..].as_mut_ptr(),
            Execution::Device => buffers.devices[device_idx][local_first * stride..].as_mut_ptr(),
        };

        Ok(BlockPartition {
            mem,
            origins: self.grid.origins()[range.start..].as_ptr(),
            masks: self.grid.masks()[range.start..].as_ptr(),
            domain_size: self.grid.dim(),
            set_idx: device,
            cardinality: self.cardinality as c_int,
            block_size: BLOCK_SIZE,
            data_view: view as c_int,
            execution: execution as c_int,
            first_block: local_first as u32,
            num_blocks: range.len() as u32,
        })
    }

    /// Device copy of `index`, for checking what a sync actually moved.
    pub fn device_value(&self, index: Index3d, component: c_int) -> Result<i32, DefaultNativeError> {
        let component = self.component(component)?;
        let Some((block, cell)) = self.grid.locate(index) else {
            return Ok(OUTSIDE_VALUE);
        };
        let (device, partition) = self
            .grid
            .partitions()
            .iter()
            .enumerate()
            .find(|(_, p)| p.range(DataView::Standard).contains(&block))
            .ok_or_else(|| DefaultNativeError::out_of_domain(index, self.grid.dim()))?;
        let buffers = self
            .buffers
            .read()
            .map_err(|_| DefaultNativeError::lock_poisoned("field buffers"))?;
        Ok(buffers.devices[device][self.offset(block - partition.first, component, cell)])
    }
}
