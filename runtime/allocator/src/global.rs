//! Process-wide heap instance
//!
//! [`LockedHeap`] serializes a `Heap<'static>` behind a spin lock so it can be
//! shared between execution contexts and registered as the Rust global
//! allocator:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: heapbind::LockedHeap = heapbind::LockedHeap::new(heapbind::HeapConfig::DEFAULT);
//! ```
//!
//! With the `global` feature the crate owns one such instance, [`HEAP`], and
//! exposes malloc-style free functions around it for code that wants a single
//! heap without threading a context object through.
//!
//! # Logging
//! A logger may allocate, and when this heap is the global allocator that
//! allocation comes straight back here. The `LockedHeap` methods therefore log
//! only after the spin lock is released, and the `GlobalAlloc` path never logs.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use spin::{Mutex, MutexGuard};
use static_assertions::assert_impl_all;

use crate::config::HeapConfig;
use crate::error::{HeapError, Result};
use crate::first_fit::ALIGNMENT;
use crate::heap::Heap;
use crate::ops::HeapOps;
use crate::region::Region;
use crate::stats::HeapStats;

/// Spin-locked heap
pub struct LockedHeap {
    inner: Mutex<Heap<'static>>,
}

assert_impl_all!(LockedHeap: Sync, Send);

impl LockedHeap {
    /// Create an unlocked heap bound to the default backend
    pub const fn new(config: HeapConfig) -> Self {
        Self {
            inner: Mutex::new(Heap::new(config)),
        }
    }

    /// Lock the heap for exclusive access
    ///
    /// Spins; never sleeps.
    pub fn lock(&self) -> MutexGuard<'_, Heap<'static>> {
        self.inner.lock()
    }

    /// Bind a custom operation set, see [`Heap::redirect`]
    pub fn redirect(&self, ops: &'static mut (dyn HeapOps + Send)) -> Result<()> {
        let name = ops.name();
        let (result, previous) = {
            let mut heap = self.lock();
            let previous = heap.ops_name();
            (heap.redirect(ops), previous)
        };

        match &result {
            Ok(()) => log::info!("heap: redirected from '{}' to '{}'", previous, name),
            Err(_) => log::warn!(
                "heap: redirect to '{}' rejected, '{}' is already locked in",
                name,
                previous
            ),
        }
        result
    }

    /// Initialize, see [`Heap::init`]
    pub fn init(&self, regions: &[Region]) -> Result<()> {
        let result = self.lock().init(regions);
        self.log_init(&result);
        result
    }

    /// Initialize from a sentinel-terminated table, see [`Heap::init_terminated`]
    pub fn init_terminated(&self, regions: &[Region]) -> Result<()> {
        let result = self.lock().init_terminated(regions);
        self.log_init(&result);
        result
    }

    fn log_init(&self, result: &Result<()>) {
        if let Err(err) = result {
            log::warn!("heap: init failed: {}", err);
            return;
        }

        let (name, total, managed) = {
            let heap = self.lock();
            (heap.ops_name(), heap.stats().total_bytes, heap.managed_bytes())
        };
        log::info!("heap: '{}' initialized with {} bytes", name, total);
        if managed != 0 && managed < total {
            log::debug!(
                "heap: '{}' uses {} of {} bytes, unaligned or unusable regions skipped",
                name,
                managed,
                total
            );
        }
    }

    /// Tear down the backend, see [`Heap::uninit`]
    pub fn uninit(&self) {
        let name = {
            let mut heap = self.lock();
            if !heap.is_locked() {
                return;
            }
            heap.uninit();
            heap.ops_name()
        };
        log::info!("heap: '{}' uninitialized", name);
    }

    /// Allocate `size` bytes, see [`Heap::malloc`]
    pub fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        let result = self.lock().try_malloc(size);
        match result {
            Err(HeapError::NotInitialized) => log::warn!("heap: malloc({}) before init", size),
            Err(HeapError::OutOfMemory { .. }) => {
                log::debug!("heap: malloc({}) failed, {} bytes free", size, self.free_size())
            }
            _ => {}
        }
        result.ok()
    }

    /// Release a block, see [`Heap::free`]
    ///
    /// # Safety
    /// `ptr` must come from this heap and not have been freed already.
    pub unsafe fn free(&self, ptr: Option<NonNull<u8>>) {
        self.lock().free(ptr)
    }

    /// Current free bytes
    pub fn free_size(&self) -> usize {
        self.lock().free_size()
    }

    /// Lowest free byte count since the heap was initialized
    pub fn min_ever_free_size(&self) -> usize {
        self.lock().min_ever_free_size()
    }

    /// Counter snapshot
    pub fn stats(&self) -> HeapStats {
        self.lock().stats()
    }
}

// Never logs; see the module docs.
unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Blocks are only guaranteed ALIGNMENT-aligned
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        self.lock()
            .malloc(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.lock().free(NonNull::new(ptr))
    }
}

/// The process-wide heap
#[cfg(feature = "global")]
pub static HEAP: LockedHeap = LockedHeap::new(HeapConfig::DEFAULT);

/// Allocate from the process-wide heap
#[cfg(feature = "global")]
pub fn malloc(size: usize) -> Option<NonNull<u8>> {
    HEAP.malloc(size)
}

/// Free a block from the process-wide heap
///
/// # Safety
/// `ptr` must come from [`malloc`] and not have been freed already.
#[cfg(feature = "global")]
pub unsafe fn free(ptr: Option<NonNull<u8>>) {
    HEAP.free(ptr)
}

/// Bind a custom operation set to the process-wide heap
///
/// Must run early during boot, before [`init`] and before any allocation.
#[cfg(feature = "global")]
pub fn redirect(ops: &'static mut (dyn HeapOps + Send)) -> Result<()> {
    HEAP.redirect(ops)
}

/// Initialize the process-wide heap
#[cfg(feature = "global")]
pub fn init(regions: &[Region]) -> Result<()> {
    HEAP.init(regions)
}

/// Initialize the process-wide heap from a sentinel-terminated table
#[cfg(feature = "global")]
pub fn init_terminated(regions: &[Region]) -> Result<()> {
    HEAP.init_terminated(regions)
}

/// Uninitialize the process-wide heap
#[cfg(feature = "global")]
pub fn uninit() {
    HEAP.uninit()
}

/// Current free bytes of the process-wide heap
#[cfg(feature = "global")]
pub fn get_free_size() -> usize {
    HEAP.free_size()
}

/// Lowest free byte count the process-wide heap has reached
#[cfg(feature = "global")]
pub fn get_min_ever_free_size() -> usize {
    HEAP.min_ever_free_size()
}

/// Counter snapshot of the process-wide heap
#[cfg(feature = "global")]
pub fn stats() -> HeapStats {
    HEAP.stats()
}
