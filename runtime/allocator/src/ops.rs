//! Operation set: the interface every heap backend implements

use core::ptr::NonNull;

use crate::region::RegionTable;

/// Status returned by a successful [`HeapOps::init`]
pub const INIT_SUCCESS: u32 = 0;

/// Heap backend operation set
///
/// A backend owns the allocation algorithm and carves its internal structures
/// out of the regions passed to [`init`](HeapOps::init). The facade never looks
/// inside a block; it only asks the backend for block sizes.
///
/// # Contract
/// - Every method must finish in bounded time and must not block, since the
///   facade may be called from interrupt context.
/// - `block_size` must report the same value for a block from the moment it is
///   returned by `malloc` until it is passed to `free`.
/// - Double frees and foreign pointers are backend-defined behaviour.
pub trait HeapOps {
    /// Allocate at least `size` bytes, or `None` if the request cannot be met
    fn malloc(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block to the backend
    ///
    /// # Safety
    /// `ptr` must have been returned by `malloc` on this backend and not freed
    /// since.
    unsafe fn free(&mut self, ptr: NonNull<u8>);

    /// Take ownership of the memory described by `regions`
    ///
    /// Returns [`INIT_SUCCESS`] on success, any other value is a
    /// backend-specific failure code.
    fn init(&mut self, regions: &RegionTable<'_>) -> u32;

    /// Number of bytes reserved for a live block, overhead included
    ///
    /// # Safety
    /// `ptr` must be a live block returned by `malloc` on this backend.
    unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize;

    /// Drop all internal state, returning to the pre-`init` condition
    ///
    /// Called by `Heap::uninit`. Backends without teardown can keep the
    /// default no-op.
    fn deinit(&mut self) {}

    /// Bytes this backend already manages without an explicit `init`
    ///
    /// Seeds the counters when the heap locks on first use; see
    /// [`FirstUsePolicy::ImplicitLock`](crate::FirstUsePolicy::ImplicitLock).
    /// A backend meant to serve allocations before `init` must override this:
    /// with the default of 0 such allocations fail with `NotInitialized`.
    fn managed_bytes(&self) -> usize {
        0
    }

    /// Short backend name for diagnostics
    fn name(&self) -> &'static str {
        "custom"
    }
}
