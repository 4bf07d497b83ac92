//! Heap configuration
//!
//! The only policy knob is what happens when the application allocates before
//! the integrator called [`Heap::init`](crate::Heap::init). Both behaviours
//! exist in comparable embedded heaps, so the choice is explicit.

/// Behaviour of an allocation issued while the heap is still unlocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstUsePolicy {
    /// Allocation fails with `NotInitialized`; `init` must come first
    RequireInit,

    /// Allocation is forwarded to the bound backend as-is. The first successful
    /// allocation locks the heap and seeds the counters from
    /// [`HeapOps::managed_bytes`](crate::HeapOps::managed_bytes).
    ///
    /// A backend reporting 0 managed bytes is treated as uninitialized and the
    /// allocation fails with `NotInitialized` without reaching it. This holds
    /// for the default `FirstFit`, which owns no memory before `init`.
    ImplicitLock,
}

/// Heap configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Unlocked-allocation policy
    pub first_use: FirstUsePolicy,
}

impl HeapConfig {
    /// Default configuration
    ///
    /// `RequireInit`, unless the crate is built with the `implicit-lock`
    /// feature.
    pub const DEFAULT: Self = Self {
        first_use: if cfg!(feature = "implicit-lock") {
            FirstUsePolicy::ImplicitLock
        } else {
            FirstUsePolicy::RequireInit
        },
    };

    /// Create a configuration with the given first-use policy
    pub const fn new(first_use: FirstUsePolicy) -> Self {
        Self { first_use }
    }

    /// Replace the first-use policy
    pub const fn with_first_use(mut self, first_use: FirstUsePolicy) -> Self {
        self.first_use = first_use;
        self
    }

    /// Whether unlocked allocations are allowed to lock the heap
    pub const fn allows_implicit_lock(&self) -> bool {
        matches!(self.first_use, FirstUsePolicy::ImplicitLock)
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
