//! Handle tables for live grids and fields.
//!
//! Handles are drawn from one counter starting at 1, so zero is never issued
//! and a handle is never reused. A deleted or forged handle simply misses
//! the table and is answered with `InvalidHandle`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use rustc_hash::FxHashMap;

use crate::engine::{BlockField, BlockGrid};
use crate::error::DefaultNativeError;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

static GRIDS: LazyLock<RwLock<FxHashMap<u64, Arc<BlockGrid>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

static FIELDS: LazyLock<RwLock<FxHashMap<u64, Arc<BlockField>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

fn lookup<T>(
    table: &RwLock<FxHashMap<u64, Arc<T>>>,
    kind: &str,
    handle: u64,
) -> Result<Arc<T>, DefaultNativeError> {
    let table = table
        .read()
        .map_err(|_| DefaultNativeError::lock_poisoned(kind))?;
    table
        .get(&handle)
        .cloned()
        .ok_or_else(|| DefaultNativeError::invalid_handle(kind, handle))
}

fn insert<T>(
    table: &RwLock<FxHashMap<u64, Arc<T>>>,
    kind: &str,
    value: Arc<T>,
) -> Result<u64, DefaultNativeError> {
    let handle = next_handle();
    table
        .write()
        .map_err(|_| DefaultNativeError::lock_poisoned(kind))?
        .insert(handle, value);
    Ok(handle)
}

fn remove<T>(
    table: &RwLock<FxHashMap<u64, Arc<T>>>,
    kind: &str,
    handle: u64,
) -> Result<(), DefaultNativeError> {
    table
        .write()
        .map_err(|_| DefaultNativeError::lock_poisoned(kind))?
        .remove(&handle)
        .map(drop)
        .ok_or_else(|| DefaultNativeError::invalid_handle(kind, handle))
}

pub(crate) fn insert_grid(grid: BlockGrid) -> Result<u64, DefaultNativeError> {
    insert(&GRIDS, "grid", Arc::new(grid))
}

pub(crate) fn grid(handle: u64) -> Result<Arc<BlockGrid>, DefaultNativeError> {
    lookup(&GRIDS, "grid", handle)
}

/// Fields created over the grid keep their own reference to its layout.
pub(crate) fn remove_grid(handle: u64) -> Result<(), DefaultNativeError> {
    remove(&GRIDS, "grid", handle)
}

pub(crate) fn insert_field(field: BlockField) -> Result<u64, DefaultNativeError> {
    insert(&FIELDS, "field", Arc::new(field))
}

pub(crate) fn field(handle: u64) -> Result<Arc<BlockField>, DefaultNativeError> {
    lookup(&FIELDS, "field", handle)
}

pub(crate) fn remove_field(handle: u64) -> Result<(), DefaultNativeError> {
    remove(&FIELDS, "field", handle)
}

/// Whether `handle` names a live field. Lets tests check for leaks.
pub fn is_live_field(handle: u64) -> bool {
    field(handle).is_ok()
}

/// Whether `handle` names a live grid.
pub fn is_live_grid(handle: u64) -> bool {
    grid(handle).is_ok()
}
