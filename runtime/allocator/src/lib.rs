//! heapbind - Redirectable heap layer for embedded targets
//!
//! # Purpose
//! Lets application code allocate and free memory through one stable surface
//! while the platform integrator picks the allocation algorithm (an operation
//! set) and the memory regions that back it, once, early during boot.
//!
//! # Integration Points
//! - Depends on: platform startup code (supplies the region table)
//! - Provides to: application code (`malloc`/`free`), `#[global_allocator]`
//! - Backends: any type implementing [`HeapOps`]; [`FirstFit`] is the default
//!
//! # Architecture
//! [`Heap`] is the binding registry and the allocation facade in one context
//! object. It starts out bound to the default [`FirstFit`] backend and unlocked.
//! [`Heap::redirect`] swaps the backend while unlocked, [`Heap::init`] hands the
//! validated [`RegionTable`] to the backend and locks the binding. Once locked,
//! redirecting or re-initializing fails with [`HeapError::AlreadyLocked`] until
//! [`Heap::uninit`] is called.
//!
//! For a process-wide heap, [`LockedHeap`] wraps a `Heap<'static>` in a spin
//! lock and implements [`core::alloc::GlobalAlloc`]. With the `global` feature
//! the crate also owns such an instance and exposes C-style free functions.
//!
//! # Example
//! ```
//! use heapbind::{Heap, HeapConfig, Region};
//!
//! #[repr(C, align(16))]
//! struct Arena([u8; 1024]);
//! let mut arena = Arena([0; 1024]);
//!
//! let mut heap = Heap::new(HeapConfig::DEFAULT);
//! heap.init(&[Region::new(arena.0.as_mut_ptr() as usize, 1024)]).unwrap();
//!
//! let block = heap.malloc(64).expect("out of memory");
//! assert!(heap.free_size() < 1024);
//! unsafe { heap.free(Some(block)) };
//! assert_eq!(heap.free_size(), 1024);
//! ```
//!
//! # Testing Strategy
//! - Unit tests: region validation, counters, state machine, first-fit algorithm
//! - Integration tests: facade driven through the `heapbind-mock` backend
//! - Benchmarks: malloc/free round trips through the facade

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod config;
mod error;
mod first_fit;
mod global;
mod heap;
mod ops;
mod region;
mod stats;

pub use config::{FirstUsePolicy, HeapConfig};
pub use error::{HeapError, RegionError, Result};
pub use first_fit::{FirstFit, ALIGNMENT, HEADER_SIZE, MIN_BLOCK_SIZE};
pub use global::LockedHeap;
pub use heap::{Heap, HeapState};
pub use ops::{HeapOps, INIT_SUCCESS};
pub use region::{Region, RegionTable};
pub use stats::HeapStats;

#[cfg(feature = "global")]
pub use global::{
    free, get_free_size, get_min_ever_free_size, init, init_terminated, malloc, redirect, stats,
    uninit, HEAP,
};
