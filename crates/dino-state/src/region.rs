//! Guarded memory region for hosting state buffers.
//!
//! Allocates `[GUARD][MEMORY][GUARD]` with the guard pages mapped `PROT_NONE`,
//! so a state buffer lives at a real address and any read that escapes the
//! bounds checks faults instead of returning stale data.

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};
use thiserror::Error;

use crate::layout::{CELL_SIZE, CellSource, StateHandle};

/// Guard page size (16KB, must be >= page size).
pub const GUARD_SIZE: usize = 1 << 14;

/// Region allocation and access errors.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("mmap failed: {0}")]
    MmapFailed(#[from] nix::Error),

    #[error("invalid region size: {0}")]
    InvalidSize(usize),

    #[error("write of {len} cells at cell {offset} exceeds region of {capacity} cells")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
}

/// Memory region with guard pages, addressed in `f32` cells.
pub struct GuardedRegion {
    /// Start of the whole mapping, including the first guard.
    region: NonNull<c_void>,
    /// Total size including both guards.
    total_size: usize,
    /// Usable size in bytes.
    size: usize,
}

impl GuardedRegion {
    /// Allocate a region of `size` usable bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or mmap/mprotect fails.
    pub fn new(size: usize) -> Result<Self, RegionError> {
        if size == 0 {
            return Err(RegionError::InvalidSize(size));
        }

        let total_size = size
            .checked_add(2 * GUARD_SIZE)
            .ok_or(RegionError::InvalidSize(size))?;
        let total_size_nz = NonZeroUsize::new(total_size).ok_or(RegionError::InvalidSize(size))?;

        let region = unsafe {
            mmap_anonymous(
                None,
                total_size_nz,
                ProtFlags::PROT_NONE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_NORESERVE,
            )?
        };

        // Open up the middle.
        let memory_start = unsafe {
            NonNull::new_unchecked(region.as_ptr().cast::<u8>().add(GUARD_SIZE).cast::<c_void>())
        };
        let protected = unsafe {
            mprotect(
                memory_start,
                size,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            )
        };
        if let Err(e) = protected {
            unsafe {
                let _ = munmap(region, total_size);
            }
            return Err(e.into());
        }

        Ok(Self {
            region,
            total_size,
            size,
        })
    }

    /// Allocate a region holding `cells` cells.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn with_cells(cells: usize) -> Result<Self, RegionError> {
        Self::new(cells.checked_mul(CELL_SIZE).ok_or(RegionError::InvalidSize(cells))?)
    }

    /// Pointer to usable memory.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        unsafe { self.region.as_ptr().cast::<u8>().add(GUARD_SIZE) }
    }

    /// Usable size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Usable size in cells.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.size / CELL_SIZE
    }

    /// Handle to the first cell.
    #[must_use]
    pub fn handle(&self) -> StateHandle {
        // mmap never returns null, and the guard offset keeps it non-null.
        StateHandle::from_ptr(self.as_ptr()).unwrap_or_else(|| unreachable!("mapped region at null"))
    }

    /// Zero the whole region.
    pub fn clear(&mut self) {
        unsafe {
            std::ptr::write_bytes(self.as_ptr(), 0, self.size);
        }
    }

    /// Write `cells` starting at cell `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::OutOfBounds`] if the write does not fit.
    pub fn write_cells(&mut self, offset: usize, cells: &[f32]) -> Result<(), RegionError> {
        let capacity = self.capacity();
        if offset.checked_add(cells.len()).is_none_or(|end| end > capacity) {
            return Err(RegionError::OutOfBounds {
                offset,
                len: cells.len(),
                capacity,
            });
        }
        let dst = unsafe { self.as_ptr().add(offset * CELL_SIZE) };
        for (i, cell) in cells.iter().enumerate() {
            unsafe {
                dst.add(i * CELL_SIZE).cast::<f32>().write_unaligned(*cell);
            }
        }
        Ok(())
    }

    /// Byte offset of `handle + byte_offset` inside the region, if a whole
    /// cell fits there.
    fn offset_of(&self, handle: StateHandle, byte_offset: usize) -> Option<usize> {
        let start = self.as_ptr() as usize;
        let offset = handle.addr().checked_sub(start)?.checked_add(byte_offset)?;
        (offset.checked_add(CELL_SIZE)? <= self.size).then_some(offset)
    }
}

impl CellSource for GuardedRegion {
    fn read_cell(&self, handle: StateHandle, byte_offset: usize) -> Option<f32> {
        let offset = self.offset_of(handle, byte_offset)?;
        Some(unsafe { self.as_ptr().add(offset).cast::<f32>().read_unaligned() })
    }
}

impl Drop for GuardedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.region, self.total_size);
        }
    }
}

// Send but not Sync (raw pointer).
unsafe impl Send for GuardedRegion {}
