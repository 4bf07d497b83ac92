//! Free-size bookkeeping

/// Heap usage counters
///
/// `free_bytes` is the total region size minus the reserved size of every live
/// block. `min_ever_free_bytes` is the lowest value `free_bytes` has reached
/// since the counters were last seeded; it never grows on a free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes handed to the backend at init
    pub total_bytes: usize,

    /// Bytes not reserved by live blocks
    pub free_bytes: usize,

    /// Lowest `free_bytes` value observed
    pub min_ever_free_bytes: usize,

    /// Successful allocations
    pub allocations: usize,

    /// Non-null frees
    pub frees: usize,

    /// Allocations that returned null
    pub failed_allocations: usize,
}

impl HeapStats {
    /// Zeroed counters
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            free_bytes: 0,
            min_ever_free_bytes: 0,
            allocations: 0,
            frees: 0,
            failed_allocations: 0,
        }
    }

    /// Restart bookkeeping for a heap of `total` bytes
    pub(crate) fn reset(&mut self, total: usize) {
        *self = Self {
            total_bytes: total,
            free_bytes: total,
            min_ever_free_bytes: total,
            ..Self::new()
        };
    }

    pub(crate) fn record_alloc(&mut self, block_size: usize) {
        debug_assert!(
            block_size <= self.free_bytes,
            "block of {} bytes exceeds the {} free bytes",
            block_size,
            self.free_bytes
        );
        self.free_bytes = self.free_bytes.saturating_sub(block_size);
        if self.free_bytes < self.min_ever_free_bytes {
            self.min_ever_free_bytes = self.free_bytes;
        }
        self.allocations += 1;
    }

    pub(crate) fn record_free(&mut self, block_size: usize) {
        debug_assert!(
            self.free_bytes
                .checked_add(block_size)
                .is_some_and(|free| free <= self.total_bytes),
            "freeing {} bytes overflows the {}-byte heap",
            block_size,
            self.total_bytes
        );
        self.free_bytes = self
            .free_bytes
            .saturating_add(block_size)
            .min(self.total_bytes);
        self.frees += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_allocations += 1;
    }

    /// Bytes reserved by live blocks
    pub fn used_bytes(&self) -> usize {
        self.total_bytes - self.free_bytes
    }

    /// Allocations not yet matched by a free
    pub fn live_allocations(&self) -> usize {
        self.allocations.saturating_sub(self.frees)
    }
}
