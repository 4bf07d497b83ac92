//! Error types for heap configuration and allocation

use thiserror::Error;

/// Region table validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("Region table is empty")]
    Empty,

    #[error("Region table is not terminated by a zero-length entry")]
    MissingSentinel,

    #[error("Region {index} has zero length")]
    ZeroLength { index: usize },

    #[error("Region {index} wraps around the end of the address space")]
    AddressOverflow { index: usize },

    #[error("Regions {first} and {second} overlap")]
    Overlap { first: usize, second: usize },
}

/// Heap binding and allocation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("Heap is locked (already initialized or in use)")]
    AlreadyLocked,

    #[error("Invalid region table: {0}")]
    InvalidRegions(#[from] RegionError),

    #[error("Backend init failed with status {code}")]
    BackendInit { code: u32 },

    #[error("Heap is not initialized")]
    NotInitialized,

    #[error("Zero-sized allocation")]
    ZeroSize,

    #[error("Out of memory (requested: {size} bytes)")]
    OutOfMemory { size: usize },
}

pub type Result<T> = core::result::Result<T, HeapError>;
