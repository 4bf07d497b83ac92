//! Default heap backend: first-fit free list
//!
//! # Design
//! - Every block starts with a [`HEADER_SIZE`]-byte header holding the block
//!   size (header included) and, while free, the next free block
//! - Free blocks form a singly-linked list ordered by address, threaded
//!   through the managed memory itself
//! - Allocation takes the first block that fits and splits off the tail when
//!   the remainder can hold a minimal block
//! - Freeing re-inserts in address order and merges with both neighbours
//! - Allocated blocks carry the top bit of `size`, which lets `free` ignore
//!   pointers whose header is not marked allocated
//!
//! All blocks are [`ALIGNMENT`]-aligned. Regions are trimmed to that alignment;
//! regions too small for one minimal block, or starting at address 0, are
//! skipped and counted in [`FirstFit::skipped_regions`].
//!
//! Nothing here logs: the allocator runs under the heap lock.

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use static_assertions::const_assert;

use crate::ops::{HeapOps, INIT_SUCCESS};
use crate::region::RegionTable;

/// Alignment of every block returned by [`FirstFit`]
pub const ALIGNMENT: usize = 8;

/// Per-block bookkeeping overhead
pub const HEADER_SIZE: usize = align_up(size_of::<BlockHeader>(), ALIGNMENT);

/// Smallest block the allocator creates, header included
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE * 2;

/// Marks a block as handed out
const ALLOCATED_BIT: usize = 1 << (usize::BITS - 1);

const_assert!(ALIGNMENT.is_power_of_two());
const_assert!(HEADER_SIZE % ALIGNMENT == 0);
const_assert!(align_of::<BlockHeader>() <= ALIGNMENT);

/// Block header, stored at the start of every block
#[repr(C)]
struct BlockHeader {
    /// Next free block (only meaningful while free)
    next: Option<NonNull<BlockHeader>>,
    /// Block size in bytes, header included, plus `ALLOCATED_BIT` when in use
    size: usize,
}

/// First-fit free-list allocator
pub struct FirstFit {
    head: Option<NonNull<BlockHeader>>,
    total_bytes: usize,
    free_bytes: usize,
    skipped_regions: usize,
    ignored_frees: usize,
    initialized: bool,
}

// The free list points into memory owned exclusively by this allocator.
unsafe impl Send for FirstFit {}

impl FirstFit {
    /// `init` called on an already initialized allocator
    pub const INIT_ALREADY_INITIALIZED: u32 = 1;

    /// No region was large enough for a single block
    pub const INIT_NO_USABLE_MEMORY: u32 = 2;

    /// Create an empty allocator
    pub const fn new() -> Self {
        Self {
            head: None,
            total_bytes: 0,
            free_bytes: 0,
            skipped_regions: 0,
            ignored_frees: 0,
            initialized: false,
        }
    }

    /// Whether `init` has succeeded since creation or the last `deinit`
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Usable bytes after alignment trimming
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Bytes in free blocks, headers included
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    /// Regions the last `init` could not use
    pub fn skipped_regions(&self) -> usize {
        self.skipped_regions
    }

    /// Frees ignored because the block was not marked allocated
    pub fn ignored_frees(&self) -> usize {
        self.ignored_frees
    }

    /// Size of the largest free block, header included
    pub fn largest_free_block(&self) -> usize {
        self.free_blocks().map(|(_, size)| size).max().unwrap_or(0)
    }

    /// Number of blocks on the free list
    pub fn free_block_count(&self) -> usize {
        self.free_blocks().count()
    }

    /// Walk the free list as `(address, size)` pairs
    fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut current = self.head;
        core::iter::from_fn(move || {
            let block = current?;
            // SAFETY: every node on the free list is a valid header
            let header = unsafe { block.as_ref() };
            current = header.next;
            Some((block.as_ptr() as usize, header.size))
        })
    }

    /// Header of the block whose payload starts at `ptr`
    ///
    /// # Safety
    /// `ptr` must be a payload pointer produced by `malloc`.
    unsafe fn header_of(ptr: NonNull<u8>) -> NonNull<BlockHeader> {
        NonNull::new_unchecked(ptr.as_ptr().sub(HEADER_SIZE) as *mut BlockHeader)
    }

    /// Insert a free block in address order, merging with its neighbours
    ///
    /// # Safety
    /// `block` must be a valid header for memory owned by this allocator and
    /// not already on the free list.
    unsafe fn insert_free_block(&mut self, block: NonNull<BlockHeader>) {
        let addr = block.as_ptr() as usize;

        // Find the last free block below `addr`
        let mut prev: Option<NonNull<BlockHeader>> = None;
        let mut current = self.head;
        while let Some(node) = current {
            if node.as_ptr() as usize > addr {
                break;
            }
            prev = current;
            current = node.as_ref().next;
        }

        // Merge with the following block if they touch
        let header = &mut *block.as_ptr();
        header.next = current;
        if let Some(next) = current {
            if addr + header.size == next.as_ptr() as usize {
                let next = next.as_ref();
                header.size += next.size;
                header.next = next.next;
            }
        }

        // Merge into the preceding block if they touch
        match prev {
            Some(prev) => {
                let prev_header = &mut *prev.as_ptr();
                if prev.as_ptr() as usize + prev_header.size == addr {
                    prev_header.size += header.size;
                    prev_header.next = header.next;
                } else {
                    prev_header.next = Some(block);
                }
            }
            None => self.head = Some(block),
        }
    }
}

impl Default for FirstFit {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapOps for FirstFit {
    fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || !self.initialized {
            return None;
        }

        let wanted = size
            .checked_add(HEADER_SIZE + ALIGNMENT - 1)
            .map(|total| total & !(ALIGNMENT - 1))?
            .max(MIN_BLOCK_SIZE);
        if wanted & ALLOCATED_BIT != 0 || wanted > self.free_bytes {
            return None;
        }

        let mut prev: Option<NonNull<BlockHeader>> = None;
        let mut current = self.head;

        while let Some(block) = current {
            // SAFETY: free-list nodes are valid headers inside managed memory
            unsafe {
                let header = &mut *block.as_ptr();
                if header.size >= wanted {
                    let next = if header.size - wanted >= MIN_BLOCK_SIZE {
                        // Split: the tail stays on the free list
                        let tail = (block.as_ptr() as *mut u8).add(wanted) as *mut BlockHeader;
                        tail.write(BlockHeader {
                            next: header.next,
                            size: header.size - wanted,
                        });
                        header.size = wanted;
                        NonNull::new(tail)
                    } else {
                        header.next
                    };

                    match prev {
                        Some(prev) => (*prev.as_ptr()).next = next,
                        None => self.head = next,
                    }

                    self.free_bytes -= header.size;
                    header.next = None;
                    header.size |= ALLOCATED_BIT;

                    return NonNull::new((block.as_ptr() as *mut u8).add(HEADER_SIZE));
                }

                prev = current;
                current = header.next;
            }
        }

        None
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let block = Self::header_of(ptr);
        let header = &mut *block.as_ptr();

        if header.size & ALLOCATED_BIT == 0 {
            self.ignored_frees += 1;
            return;
        }

        header.size &= !ALLOCATED_BIT;
        self.free_bytes += header.size;
        self.insert_free_block(block);
    }

    fn init(&mut self, regions: &RegionTable<'_>) -> u32 {
        if self.initialized {
            return Self::INIT_ALREADY_INITIALIZED;
        }

        self.skipped_regions = 0;
        for region in regions.iter() {
            let start = match region.start.checked_add(ALIGNMENT - 1) {
                Some(start) => start & !(ALIGNMENT - 1),
                None => {
                    self.skipped_regions += 1;
                    continue;
                }
            };
            let end = region.end().unwrap_or(usize::MAX) & !(ALIGNMENT - 1);

            // Too small once aligned
            if end <= start || end - start < MIN_BLOCK_SIZE {
                self.skipped_regions += 1;
                continue;
            }

            // A header cannot live at the null address
            let Some(block) = NonNull::new(start as *mut BlockHeader) else {
                self.skipped_regions += 1;
                continue;
            };
            let size = end - start;

            // SAFETY: the region table hands this memory to us exclusively and
            // `start` is aligned for a header
            unsafe {
                block.as_ptr().write(BlockHeader { next: None, size });
                self.insert_free_block(block);
            }

            self.total_bytes += size;
            self.free_bytes += size;
        }

        if self.total_bytes == 0 {
            return Self::INIT_NO_USABLE_MEMORY;
        }

        self.initialized = true;
        INIT_SUCCESS
    }

    unsafe fn block_size(&self, ptr: NonNull<u8>) -> usize {
        Self::header_of(ptr).as_ref().size & !ALLOCATED_BIT
    }

    fn deinit(&mut self) {
        *self = Self::new();
    }

    fn managed_bytes(&self) -> usize {
        self.total_bytes
    }

    fn name(&self) -> &'static str {
        "first-fit"
    }
}

/// Align value up to alignment
#[inline]
const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}
