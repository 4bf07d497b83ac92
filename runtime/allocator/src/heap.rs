//! Binding registry and allocation facade
//!
//! [`Heap`] decides which operation set is authoritative and forwards every
//! allocation to it while keeping the free-size counters.
//!
//! # State machine
//! ```text
//!   UnboundUnlocked --redirect--> BoundUnlocked
//!         |                            |
//!         +------- init / first malloc-+--> BoundLocked
//!                                             |
//!   (binding kept) <----------- uninit -------+
//! ```
//! - `redirect` is only accepted while unlocked
//! - `init` is only accepted while unlocked and locks on success
//! - a successful allocation locks the heap if the first-use policy allows
//!   allocating before `init` and the backend already manages memory
//! - `uninit` unlocks and tears the backend down, keeping the binding
//!
//! # Concurrency
//! `Heap` is a plain `&mut self` object. Configuration calls must come from a
//! single context with no allocation in flight, and concurrent allocations
//! must be serialized by the caller; [`LockedHeap`](crate::LockedHeap) does
//! that with a spin lock.
//!
//! `Heap` never logs. It may run under that lock, and a logger that allocates
//! would re-enter it; failures are reported through [`HeapError`] instead.

use core::ptr::NonNull;

use crate::config::{FirstUsePolicy, HeapConfig};
use crate::error::{HeapError, Result};
use crate::first_fit::FirstFit;
use crate::ops::{HeapOps, INIT_SUCCESS};
use crate::region::{Region, RegionTable};
use crate::stats::HeapStats;

/// Binding state of a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapState {
    /// Default backend, configuration still allowed
    UnboundUnlocked,
    /// Redirected backend, configuration still allowed
    BoundUnlocked,
    /// Backend and regions committed
    BoundLocked,
}

/// Heap context: binding registry plus allocation facade
///
/// Starts bound to an owned [`FirstFit`] backend. A redirected backend is
/// borrowed for `'a`; use `'static` for a process-wide heap.
pub struct Heap<'a> {
    default_ops: FirstFit,
    redirected: Option<&'a mut (dyn HeapOps + Send)>,
    locked: bool,
    config: HeapConfig,
    stats: HeapStats,
}

impl<'a> Heap<'a> {
    /// Create an unlocked heap bound to the default backend
    pub const fn new(config: HeapConfig) -> Self {
        Self {
            default_ops: FirstFit::new(),
            redirected: None,
            locked: false,
            config,
            stats: HeapStats::new(),
        }
    }

    fn ops(&self) -> &dyn HeapOps {
        match &self.redirected {
            Some(ops) => &**ops,
            None => &self.default_ops,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn HeapOps {
        match &mut self.redirected {
            Some(ops) => &mut **ops,
            None => &mut self.default_ops,
        }
    }

    /// Bind a different operation set
    ///
    /// # Errors
    /// `AlreadyLocked` once the heap was initialized or used; the previous
    /// binding stays in place.
    pub fn redirect(&mut self, ops: &'a mut (dyn HeapOps + Send)) -> Result<()> {
        if self.locked {
            return Err(HeapError::AlreadyLocked);
        }

        self.redirected = Some(ops);
        Ok(())
    }

    /// Validate `regions`, hand them to the bound backend and lock the heap
    ///
    /// # Errors
    /// - `AlreadyLocked` if called again without `uninit`
    /// - `InvalidRegions` if the table is empty, has zero-length entries or
    ///   overlapping regions
    /// - `BackendInit` if the backend reports a non-zero status
    pub fn init(&mut self, regions: &[Region]) -> Result<()> {
        self.check_unlocked()?;
        let table = RegionTable::new(regions)?;
        self.init_table(&table)
    }

    /// Like [`Heap::init`], for a table terminated by [`Region::SENTINEL`]
    pub fn init_terminated(&mut self, regions: &[Region]) -> Result<()> {
        self.check_unlocked()?;
        let table = RegionTable::from_terminated(regions)?;
        self.init_table(&table)
    }

    /// Hand an already validated table to the bound backend and lock the heap
    pub fn init_table(&mut self, table: &RegionTable<'_>) -> Result<()> {
        self.check_unlocked()?;

        let code = self.ops_mut().init(table);
        if code != INIT_SUCCESS {
            return Err(HeapError::BackendInit { code });
        }

        self.stats.reset(table.total_size());
        self.locked = true;
        Ok(())
    }

    fn check_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(HeapError::AlreadyLocked);
        }
        Ok(())
    }

    /// Tear down the backend and unlock the heap
    ///
    /// The binding is kept. Calling this while unlocked does nothing.
    /// No block may be outstanding; the heap does not track live blocks.
    pub fn uninit(&mut self) {
        if !self.locked {
            return;
        }

        self.ops_mut().deinit();
        self.stats = HeapStats::new();
        self.locked = false;
    }

    /// Allocate `size` bytes
    ///
    /// Returns `None` for `size == 0`, when out of memory, or when the heap
    /// is not initialized and the first-use policy requires `init`.
    pub fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.try_malloc(size).ok()
    }

    /// Allocate `size` bytes, reporting why an allocation failed
    ///
    /// # Errors
    /// - `ZeroSize` for `size == 0`; the backend is not called
    /// - `NotInitialized` when unlocked under `FirstUsePolicy::RequireInit`,
    ///   or under `FirstUsePolicy::ImplicitLock` when the bound backend reports
    ///   no [`managed_bytes`](HeapOps::managed_bytes); the backend is not called
    /// - `OutOfMemory` when the backend returns null
    pub fn try_malloc(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }

        // Capacity the counters are seeded with if this call locks the heap
        let mut seed = None;
        if !self.locked {
            let managed = self.ops().managed_bytes();
            if self.config.first_use == FirstUsePolicy::RequireInit || managed == 0 {
                return Err(HeapError::NotInitialized);
            }
            seed = Some(managed);
        }

        let Some(ptr) = self.ops_mut().malloc(size) else {
            self.stats.record_failure();
            return Err(HeapError::OutOfMemory { size });
        };

        if let Some(managed) = seed {
            self.stats.reset(managed);
            self.locked = true;
        }

        // SAFETY: `ptr` was just returned by the bound backend
        let block = unsafe { self.ops().block_size(ptr) };
        self.stats.record_alloc(block);
        Ok(ptr)
    }

    /// Release a block
    ///
    /// `None` is ignored.
    ///
    /// # Safety
    /// `ptr` must come from `malloc` on this heap, with the same binding, and
    /// must not have been freed already.
    pub unsafe fn free(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };

        let block = self.ops().block_size(ptr);
        self.ops_mut().free(ptr);
        self.stats.record_free(block);
    }

    /// Reserved size of a live block, backend overhead included
    ///
    /// # Safety
    /// `ptr` must be a live block from this heap.
    pub unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize {
        self.ops().block_size(ptr)
    }

    /// Bytes the bound backend reports it can hand out
    pub fn managed_bytes(&self) -> usize {
        self.ops().managed_bytes()
    }

    /// Current free bytes
    pub fn free_size(&self) -> usize {
        self.stats.free_bytes
    }

    /// Lowest free byte count since the heap was initialized
    pub fn min_ever_free_size(&self) -> usize {
        self.stats.min_ever_free_bytes
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Whether configuration is frozen
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether a custom operation set replaced the default
    pub fn is_redirected(&self) -> bool {
        self.redirected.is_some()
    }

    /// Current binding state
    pub fn state(&self) -> HeapState {
        match (self.locked, self.redirected.is_some()) {
            (true, _) => HeapState::BoundLocked,
            (false, true) => HeapState::BoundUnlocked,
            (false, false) => HeapState::UnboundUnlocked,
        }
    }

    /// Name of the bound operation set
    pub fn ops_name(&self) -> &'static str {
        self.ops().name()
    }

    /// Active configuration
    pub fn config(&self) -> HeapConfig {
        self.config
    }
}

impl Default for Heap<'_> {
    fn default() -> Self {
        Self::new(HeapConfig::DEFAULT)
    }
}
