//! Integration tests for the binding registry and the heap facade
//!
//! These tests drive `Heap` through the mock backend so the region tables can
//! use made-up addresses and every backend call can be observed.

use core::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use heapbind::*;
use heapbind_mock::MockOps;

fn require_init() -> HeapConfig {
    HeapConfig::new(FirstUsePolicy::RequireInit)
}

fn implicit_lock() -> HeapConfig {
    HeapConfig::new(FirstUsePolicy::ImplicitLock)
}

/// Single 256-byte region at 0x1000, freed block restores the full size
#[test]
fn test_single_region_walkthrough() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());

    heap.redirect(&mut mock).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert_eq!(heap.free_size(), 256);

    let handle = heap.malloc(64).expect("allocation failed");
    let block = unsafe { heap.block_size(handle) };
    assert_eq!(heap.free_size(), 256 - block);

    unsafe { heap.free(Some(handle)) };
    assert_eq!(heap.free_size(), 256);
    assert_eq!(heap.min_ever_free_size(), 256 - block);
}

/// Same walkthrough with the C-style sentinel-terminated table
#[test]
fn test_sentinel_terminated_init() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();

    let regions = [Region::new(0x1000, 256), Region::SENTINEL];
    heap.init_terminated(&regions).unwrap();
    assert_eq!(heap.free_size(), 256);
    assert!(heap.is_locked());
}

#[test]
fn test_redirect_before_lock_is_used() {
    let mut mock = MockOps::new("custom-mock");
    let mut heap = Heap::new(require_init());

    assert_eq!(heap.state(), HeapState::UnboundUnlocked);
    heap.redirect(&mut mock).unwrap();
    assert_eq!(heap.state(), HeapState::BoundUnlocked);
    assert_eq!(heap.ops_name(), "custom-mock");

    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert_eq!(heap.state(), HeapState::BoundLocked);
    let ptr = heap.malloc(16).unwrap();
    unsafe { heap.free(Some(ptr)) };

    assert_eq!(mock.calls().init, 1);
    assert_eq!(mock.calls().malloc, 1);
    assert_eq!(mock.calls().free, 1);
}

#[test]
fn test_last_redirect_before_lock_wins() {
    let mut first = MockOps::new("first");
    let mut second = MockOps::new("second");
    let mut heap = Heap::new(require_init());

    heap.redirect(&mut first).unwrap();
    heap.redirect(&mut second).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert!(heap.malloc(16).is_some());
    assert_eq!(heap.ops_name(), "second");

    assert_eq!(first.calls().init, 0);
    assert_eq!(second.calls().init, 1);
    assert_eq!(second.calls().malloc, 1);
}

#[test]
fn test_redirect_after_init_rejected() {
    let mut bound = MockOps::new("bound");
    let mut late = MockOps::new("late");
    let mut heap = Heap::new(require_init());

    heap.redirect(&mut bound).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();

    assert_eq!(heap.redirect(&mut late), Err(HeapError::AlreadyLocked));
    assert_eq!(heap.ops_name(), "bound");
    assert!(heap.malloc(32).is_some());

    assert_eq!(bound.calls().malloc, 1);
    assert_eq!(late.calls().malloc, 0);
    assert_eq!(late.calls().init, 0);
}

#[test]
fn test_redirect_after_first_use_rejected() {
    let regions = [Region::new(0x1000, 512)];
    let mut preloaded = MockOps::preloaded("preloaded", &regions);
    let mut late = MockOps::new("late");
    let mut heap = Heap::new(implicit_lock());

    heap.redirect(&mut preloaded).unwrap();
    assert!(heap.malloc(8).is_some());
    assert!(heap.is_locked());

    assert_eq!(heap.redirect(&mut late), Err(HeapError::AlreadyLocked));
    assert_eq!(heap.init(&regions), Err(HeapError::AlreadyLocked));
    assert_eq!(heap.ops_name(), "preloaded");
}

#[test]
fn test_init_twice_rejected() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();

    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert_eq!(
        heap.init(&[Region::new(0x4000, 256)]),
        Err(HeapError::AlreadyLocked)
    );
    // Counters still describe the first table
    assert_eq!(heap.free_size(), 256);
    assert_eq!(mock.calls().init, 1);
}

#[test]
fn test_invalid_regions_rejected() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();

    let cases: [(&[Region], RegionError); 3] = [
        (&[], RegionError::Empty),
        (
            &[Region::new(0x1000, 256), Region::new(0x2000, 0)],
            RegionError::ZeroLength { index: 1 },
        ),
        (
            &[Region::new(0x1000, 256), Region::new(0x1080, 256)],
            RegionError::Overlap { first: 0, second: 1 },
        ),
    ];

    for (regions, expected) in cases {
        assert_eq!(heap.init(regions), Err(HeapError::InvalidRegions(expected)));
        assert!(!heap.is_locked());
    }

    // Missing sentinel and interior zero-length entry in the terminated form
    assert_eq!(
        heap.init_terminated(&[Region::new(0x1000, 256)]),
        Err(HeapError::InvalidRegions(RegionError::MissingSentinel))
    );
    assert_eq!(
        heap.init_terminated(&[
            Region::new(0x1000, 256),
            Region::new(0x2000, 0),
            Region::new(0x3000, 256),
            Region::SENTINEL,
        ]),
        Err(HeapError::InvalidRegions(RegionError::ZeroLength { index: 1 }))
    );
    assert!(!heap.is_locked());

    // The backend never saw a malformed table
    assert_eq!(mock.calls().init, 0);
}

#[test]
fn test_backend_init_failure() {
    let mut failing = MockOps::new("failing").with_init_status(3);
    let mut working = MockOps::new("working");
    let mut heap = Heap::new(require_init());

    heap.redirect(&mut failing).unwrap();
    assert_eq!(
        heap.init(&[Region::new(0x1000, 256)]),
        Err(HeapError::BackendInit { code: 3 })
    );
    assert!(!heap.is_locked());
    assert_eq!(heap.free_size(), 0);

    // Still unlocked, so the integrator can pick another backend
    heap.redirect(&mut working).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert_eq!(heap.ops_name(), "working");
}

#[test]
fn test_uninit_cycle() {
    let mut mock = MockOps::new("mock");
    let mut other = MockOps::new("other");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();

    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    let ptr = heap.malloc(32).unwrap();
    unsafe { heap.free(Some(ptr)) };

    heap.uninit();
    assert_eq!(heap.state(), HeapState::BoundUnlocked);
    assert_eq!(heap.ops_name(), "mock");
    assert_eq!(heap.free_size(), 0);
    assert_eq!(heap.min_ever_free_size(), 0);

    // Second uninit changes nothing
    let snapshot = heap.stats();
    heap.uninit();
    assert_eq!(heap.stats(), snapshot);
    assert_eq!(heap.state(), HeapState::BoundUnlocked);

    // Configuration is open again
    heap.init(&[Region::new(0x8000, 128)]).unwrap();
    assert_eq!(heap.free_size(), 128);
    heap.uninit();
    heap.redirect(&mut other).unwrap();
    assert_eq!(heap.ops_name(), "other");

    assert_eq!(mock.calls().init, 2);
    assert_eq!(mock.calls().deinit, 2);
}

#[test]
fn test_malloc_requires_init() {
    let mut mock = MockOps::preloaded("mock", &[Region::new(0x1000, 256)]);
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();

    assert_eq!(heap.try_malloc(16), Err(HeapError::NotInitialized));
    assert!(!heap.is_locked());
    assert_eq!(mock.calls().malloc, 0);
}

#[test]
fn test_implicit_lock_on_first_malloc() {
    let mut mock = MockOps::preloaded("mock", &[Region::new(0x1000, 256)]);
    let mut heap = Heap::new(implicit_lock());
    heap.redirect(&mut mock).unwrap();

    let ptr = heap.malloc(16).unwrap();
    assert_eq!(heap.state(), HeapState::BoundLocked);

    let block = unsafe { heap.block_size(ptr) };
    assert_eq!(heap.stats().total_bytes, 256);
    assert_eq!(heap.free_size(), 256 - block);
    assert_eq!(heap.min_ever_free_size(), 256 - block);
}

#[test]
fn test_implicit_lock_needs_managed_memory() {
    // Nothing loaded: there is no capacity to seed the counters with
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(implicit_lock());
    heap.redirect(&mut mock).unwrap();

    assert_eq!(heap.try_malloc(16), Err(HeapError::NotInitialized));
    assert!(!heap.is_locked());

    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    assert!(heap.malloc(16).is_some());

    // Only the allocation after init reached the backend
    assert_eq!(mock.calls().malloc, 1);
}

#[test]
fn test_implicit_lock_failure_keeps_unlocked() {
    let mut mock = MockOps::preloaded("mock", &[Region::new(0x1000, 256)]);
    mock.fail_next_mallocs(1);
    let mut heap = Heap::new(implicit_lock());
    heap.redirect(&mut mock).unwrap();

    assert_eq!(heap.try_malloc(16), Err(HeapError::OutOfMemory { size: 16 }));
    assert!(!heap.is_locked());

    assert!(heap.malloc(16).is_some());
    assert!(heap.is_locked());
    assert_eq!(heap.stats().total_bytes, 256);
}

/// Backend with only the required capabilities: fixed 64-byte blocks at fake
/// addresses, no `managed_bytes`
struct FixedBlocks<'c> {
    next: usize,
    mallocs: &'c AtomicUsize,
}

impl HeapOps for FixedBlocks<'_> {
    fn malloc(&mut self, _size: usize) -> Option<NonNull<u8>> {
        self.mallocs.fetch_add(1, Ordering::SeqCst);
        self.next += 64;
        NonNull::new(self.next as *mut u8)
    }

    unsafe fn free(&mut self, _ptr: NonNull<u8>) {}

    fn init(&mut self, _regions: &RegionTable<'_>) -> u32 {
        INIT_SUCCESS
    }

    unsafe fn block_size(&self, _ptr: NonNull<u8>) -> usize {
        64
    }
}

#[test]
fn test_implicit_lock_with_required_capabilities_only() {
    let mallocs = AtomicUsize::new(0);
    let mut backend = FixedBlocks {
        next: 0x1000,
        mallocs: &mallocs,
    };
    let mut heap = Heap::new(implicit_lock());
    heap.redirect(&mut backend).unwrap();

    // No capacity reported, so first use cannot lock the heap
    assert_eq!(heap.try_malloc(16), Err(HeapError::NotInitialized));
    assert!(!heap.is_locked());
    assert_eq!(mallocs.load(Ordering::SeqCst), 0);

    // With an explicit init the counters follow every block
    heap.init(&[Region::new(0x1000, 256)]).unwrap();
    let a = heap.malloc(16);
    let b = heap.malloc(16);
    assert_eq!(heap.free_size(), 256 - 128);
    assert_eq!(heap.min_ever_free_size(), 256 - 128);

    unsafe {
        heap.free(a);
        heap.free(b);
    }
    assert_eq!(heap.free_size(), 256);
    assert_eq!(heap.min_ever_free_size(), 256 - 128);
    assert_eq!(mallocs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_zero_size_skips_backend() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();

    assert!(heap.malloc(0).is_none());
    assert_eq!(heap.free_size(), 256);
    assert_eq!(mock.calls().malloc, 0);
}

#[test]
fn test_out_of_memory_keeps_counters() {
    let mut mock = MockOps::new("mock");
    mock.fail_next_mallocs(1);
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();

    assert!(heap.malloc(16).is_none());
    assert_eq!(heap.free_size(), 256);
    assert_eq!(heap.min_ever_free_size(), 256);
    assert_eq!(heap.stats().failed_allocations, 1);

    // Bigger than the whole region
    assert_eq!(heap.try_malloc(512), Err(HeapError::OutOfMemory { size: 512 }));
    assert_eq!(heap.free_size(), 256);
}

#[test]
fn test_free_none_skips_backend() {
    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();
    heap.init(&[Region::new(0x1000, 256)]).unwrap();

    unsafe { heap.free(None) };
    assert_eq!(heap.free_size(), 256);
    assert_eq!(mock.calls().free, 0);
    assert_eq!(mock.calls().block_size.get(), 0);
}

#[test]
fn test_block_size_reflects_overhead() {
    let mut mock = MockOps::new("mock").with_overhead(24);
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();
    heap.init(&[Region::new(0x1000, 1024)]).unwrap();

    let ptr = heap.malloc(10).unwrap();
    // 10 rounded to 16, plus 24 bytes of overhead
    assert_eq!(unsafe { heap.block_size(ptr) }, 40);
    assert_eq!(heap.free_size(), 1024 - 40);
}

/// Outstanding blocks always account for the gap between total and free
#[test]
fn test_conservation_over_mixed_sequence() {
    let regions = [Region::new(0x10_0000, 4096), Region::new(0x20_0000, 4096)];
    let total: usize = regions.iter().map(|r| r.size).sum();

    let mut mock = MockOps::new("mock");
    let mut heap = Heap::new(require_init());
    heap.redirect(&mut mock).unwrap();
    heap.init(&regions).unwrap();

    // Deterministic LCG so the sequence is reproducible
    let mut seed: u32 = 0x2545_f491;
    let mut next = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (seed >> 16) as usize
    };

    let mut live = Vec::new();
    let mut last_min = heap.min_ever_free_size();

    for _ in 0..200 {
        if live.is_empty() || next() % 3 != 0 {
            if let Some(ptr) = heap.malloc(1 + next() % 96) {
                live.push(ptr);
            }
        } else {
            let index = next() % live.len();
            let ptr = live.swap_remove(index);
            unsafe { heap.free(Some(ptr)) };
        }

        let outstanding: usize = live.iter().map(|&p| unsafe { heap.block_size(p) }).sum();
        assert_eq!(heap.free_size(), total - outstanding);

        // Never increases, and tracks every new low
        let min = heap.min_ever_free_size();
        assert!(min <= last_min);
        assert!(min <= heap.free_size());
        last_min = min;
    }

    for ptr in live.drain(..) {
        unsafe { heap.free(Some(ptr)) };
    }
    assert_eq!(heap.free_size(), total);
    assert_eq!(heap.min_ever_free_size(), last_min);
}
