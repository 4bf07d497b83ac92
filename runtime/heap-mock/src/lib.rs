//! MOCK heap backend for testing heapbind
//!
//! # WARNING: This does NOT manage real memory!
//!
//! [`MockOps`] hands out fake addresses carved from the region descriptors it
//! is given and never reads or writes through them. That lets tests use
//! made-up region tables such as `[{0x1000, 256}]` and observe exactly how the
//! facade drives its backend.
//!
//! ## Behaviour
//! - Blocks are bumped forward through the regions in table order; freed
//!   addresses are not reused
//! - Each block reserves the request rounded up to 8 bytes plus a fixed
//!   overhead (default 8 bytes)
//! - Every call is counted in [`CallCounts`]
//! - Failures can be injected for `init` and `malloc`
//!
//! Used ONLY for unit tests, integration tests and benchmarks.

#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::Cell;
use core::ptr::NonNull;

use heapbind::{HeapOps, Region, RegionTable, INIT_SUCCESS};

/// Block alignment of the simulated heap
pub const MOCK_ALIGNMENT: usize = 8;

/// Default per-block overhead
pub const DEFAULT_OVERHEAD: usize = 8;

/// Number of times each backend capability was invoked
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub malloc: usize,
    pub free: usize,
    pub init: usize,
    pub deinit: usize,
    pub block_size: Cell<usize>,
}

/// Bump-style fake backend
pub struct MockOps {
    name: &'static str,
    overhead: usize,
    init_status: u32,
    failing_mallocs: usize,
    /// `(next, end)` per region
    cursors: Vec<(usize, usize)>,
    capacity: usize,
    live: BTreeMap<usize, usize>,
    invalid_frees: usize,
    calls: CallCounts,
}

impl MockOps {
    /// Uninitialized mock named `name`
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            overhead: DEFAULT_OVERHEAD,
            init_status: INIT_SUCCESS,
            failing_mallocs: 0,
            cursors: Vec::new(),
            capacity: 0,
            live: BTreeMap::new(),
            invalid_frees: 0,
            calls: CallCounts::default(),
        }
    }

    /// Mock that already owns `regions`, as if set up before the heap saw it
    ///
    /// Useful together with `FirstUsePolicy::ImplicitLock`.
    pub fn preloaded(name: &'static str, regions: &[Region]) -> Self {
        let mut mock = Self::new(name);
        mock.load(regions.iter());
        mock
    }

    /// Set the per-block overhead
    pub fn with_overhead(mut self, overhead: usize) -> Self {
        self.overhead = overhead;
        self
    }

    /// Make `init` return `status`
    pub fn with_init_status(mut self, status: u32) -> Self {
        self.init_status = status;
        self
    }

    /// Make the next `count` calls to `malloc` return null
    pub fn fail_next_mallocs(&mut self, count: usize) {
        self.failing_mallocs = count;
    }

    /// Call counters
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Blocks handed out and not freed yet
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Frees of addresses this mock never handed out (or already freed)
    pub fn invalid_frees(&self) -> usize {
        self.invalid_frees
    }

    /// Whether the mock currently owns any memory
    pub fn is_loaded(&self) -> bool {
        !self.cursors.is_empty()
    }

    /// Bytes a request of `size` reserves, `None` if that overflows
    pub fn reserved_for(&self, size: usize) -> Option<usize> {
        let rounded = size.checked_add(MOCK_ALIGNMENT - 1)? & !(MOCK_ALIGNMENT - 1);
        rounded.checked_add(self.overhead)
    }

    fn load<'r>(&mut self, regions: impl Iterator<Item = &'r Region>) {
        for region in regions {
            self.cursors.push((region.start, region.start + region.size));
            self.capacity += region.size;
        }
    }
}

impl HeapOps for MockOps {
    fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.calls.malloc += 1;

        if self.failing_mallocs > 0 {
            self.failing_mallocs -= 1;
            return None;
        }

        let reserved = self.reserved_for(size)?;
        let (next, _) = self
            .cursors
            .iter_mut()
            .find(|(next, end)| end - *next >= reserved)?;

        let addr = *next;
        *next += reserved;
        self.live.insert(addr, reserved);
        NonNull::new(addr as *mut u8)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        self.calls.free += 1;

        if self.live.remove(&(ptr.as_ptr() as usize)).is_none() {
            log::warn!("mock: free of unknown block {:p}", ptr);
            self.invalid_frees += 1;
        }
    }

    fn init(&mut self, regions: &RegionTable<'_>) -> u32 {
        self.calls.init += 1;

        if self.init_status != INIT_SUCCESS {
            return self.init_status;
        }

        self.cursors.clear();
        self.capacity = 0;
        self.load(regions.iter());
        INIT_SUCCESS
    }

    unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize {
        self.calls.block_size.set(self.calls.block_size.get() + 1);
        self.live
            .get(&(ptr.as_ptr() as usize))
            .copied()
            .unwrap_or(0)
    }

    fn deinit(&mut self) {
        self.calls.deinit += 1;
        self.cursors.clear();
        self.live.clear();
        self.capacity = 0;
    }

    fn managed_bytes(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
