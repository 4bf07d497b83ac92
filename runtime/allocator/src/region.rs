//! Memory regions handed to the heap backend
//!
//! A [`RegionTable`] is a validated, explicit-length view over the regions the
//! integrator wants the backend to manage. Tables written in the C style, with
//! a trailing zero-length entry, go through [`RegionTable::from_terminated`].

use crate::error::RegionError;

/// A contiguous span of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Start address
    pub start: usize,

    /// Length in bytes
    pub size: usize,
}

impl Region {
    /// Zero-length terminator used by sentinel-terminated tables
    pub const SENTINEL: Self = Self { start: 0, size: 0 };

    /// Create a region descriptor
    pub const fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    /// Whether this entry terminates a sentinel-terminated table
    pub const fn is_sentinel(&self) -> bool {
        self.size == 0
    }

    /// One past the last address, or `None` if the region wraps
    pub const fn end(&self) -> Option<usize> {
        self.start.checked_add(self.size)
    }

    /// Check whether two regions share at least one byte
    ///
    /// Both regions must have a valid end address.
    pub fn overlaps(&self, other: &Region) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => self.start < other_end && other.start < end,
            _ => false,
        }
    }
}

/// Validated region table
///
/// Guarantees at least one region, no zero-length entries, no entry wrapping
/// the address space and no overlapping pair. Entries keep the order the
/// integrator gave them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTable<'r> {
    regions: &'r [Region],
}

impl<'r> RegionTable<'r> {
    /// Validate an explicit-length region list
    ///
    /// # Errors
    /// - `Empty` if `regions` is empty
    /// - `ZeroLength` / `AddressOverflow` for the first malformed entry
    /// - `Overlap` for the first overlapping pair
    pub fn new(regions: &'r [Region]) -> Result<Self, RegionError> {
        if regions.is_empty() {
            return Err(RegionError::Empty);
        }

        for (index, region) in regions.iter().enumerate() {
            if region.size == 0 {
                return Err(RegionError::ZeroLength { index });
            }
            if region.end().is_none() {
                return Err(RegionError::AddressOverflow { index });
            }
        }

        // Tables are a handful of entries long, a pairwise scan is fine
        for (first, a) in regions.iter().enumerate() {
            for (offset, b) in regions[first + 1..].iter().enumerate() {
                if a.overlaps(b) {
                    return Err(RegionError::Overlap {
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
        }

        Ok(Self { regions })
    }

    /// Validate a sentinel-terminated region list
    ///
    /// The last entry must be [`Region::SENTINEL`] (any zero-length entry); it
    /// is stripped and the rest is validated like [`RegionTable::new`], so a
    /// zero-length entry before the end is rejected.
    pub fn from_terminated(regions: &'r [Region]) -> Result<Self, RegionError> {
        match regions.split_last() {
            Some((last, body)) if last.is_sentinel() => Self::new(body),
            _ => Err(RegionError::MissingSentinel),
        }
    }

    /// Number of regions (the table is never empty)
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Always `false`; present for API symmetry with slices
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterate over the regions in table order
    pub fn iter(&self) -> core::slice::Iter<'r, Region> {
        self.regions.iter()
    }

    /// Underlying region slice
    pub fn as_slice(&self) -> &'r [Region] {
        self.regions
    }

    /// Sum of all region sizes
    pub fn total_size(&self) -> usize {
        self.regions
            .iter()
            .fold(0usize, |total, region| total.saturating_add(region.size))
    }
}

impl<'r> IntoIterator for RegionTable<'r> {
    type Item = &'r Region;
    type IntoIter = core::slice::Iter<'r, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
