//! Installing 2 MiB kernel mappings.
//!
//! [`map_frames`] writes PMD leaves for frames the caller already owns;
//! [`Vmm`] combines the walker and the allocator to back fresh PMD slots.

use crate::frame_alloc::{AllocError, FrameAllocator, PageFrames};
use kernel_memory_addresses::{FRAMES_PER_LARGE_PAGE, PhysicalPage, Size2M};
use kernel_vmem::{ENTRIES_PER_TABLE, KernelPageTables, PageEntry, PhysMapper, Pmd, PmdIndex, WalkError};
use log::debug;

/// Map `n` consecutive 2 MiB pages of `frames` into `pmd`, starting at slot
/// `start`. Each entry advances [`FRAMES_PER_LARGE_PAGE`] frames.
///
/// The run must hold at least `n * 512` frames, start 2 MiB aligned, and the
/// slots must fit the table; only debug builds check this.
pub fn map_frames(pmd: &mut Pmd, start: PmdIndex, frames: &PageFrames, n: usize, flags: PageEntry) {
    debug_assert!(frames.count() >= n as u64 * FRAMES_PER_LARGE_PAGE);
    debug_assert!(frames.phys().is_aligned::<Size2M>());
    debug_assert!(start.as_usize() + n <= ENTRIES_PER_TABLE);

    let first = PhysicalPage::<Size2M>::from_addr(frames.phys());
    pmd.map_large_pages(start, first, n, flags);
}

/// Map the first 2 MiB page of `frames` at slot `slot`.
pub fn map_frame(pmd: &mut Pmd, slot: PmdIndex, frames: &PageFrames, flags: PageEntry) {
    map_frames(pmd, slot, frames, 1, flags);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("{pages} large pages from PMD slot {start} exceed the table")]
    OutOfRange { start: usize, pages: usize },
}

/// Kernel mapping manager: the kernel page tables plus the frame pool.
pub struct Vmm<'m, 'p, M: PhysMapper> {
    tables: KernelPageTables<'m, M>,
    alloc: &'m mut FrameAllocator<'p>,
}

impl<'m, 'p, M: PhysMapper> Vmm<'m, 'p, M> {
    /// # Safety
    /// See [`KernelPageTables::from_current`].
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    pub unsafe fn from_current(mapper: &'m M, alloc: &'m mut FrameAllocator<'p>) -> Self {
        let tables = unsafe { KernelPageTables::from_current(mapper) };
        Self { tables, alloc }
    }

    pub const fn new(tables: KernelPageTables<'m, M>, alloc: &'m mut FrameAllocator<'p>) -> Self {
        Self { tables, alloc }
    }

    pub const fn tables(&mut self) -> &mut KernelPageTables<'m, M> {
        &mut self.tables
    }

    /// Allocate `pages` fresh 2 MiB pages and map them into the kernel PMD
    /// from slot `start` on. The caller owns the returned frames.
    ///
    /// # Errors
    /// - [`VmmError::OutOfRange`] if the slots do not fit the PMD.
    /// - [`VmmError::Alloc`] if no aligned run is free.
    /// - [`VmmError::Walk`] if the kernel PMD is not reachable; the frames
    ///   are returned to the pool.
    pub fn map_new_frames(
        &mut self,
        start: PmdIndex,
        pages: usize,
        flags: PageEntry,
    ) -> Result<PageFrames, VmmError> {
        if start.as_usize() + pages > ENTRIES_PER_TABLE {
            return Err(VmmError::OutOfRange {
                start: start.as_usize(),
                pages,
            });
        }

        let frames = self.alloc.alloc_large_frames(pages as u64)?;
        let pmd = match self.tables.pmd() {
            Ok(pmd) => pmd,
            Err(e) => {
                self.alloc.release_frames(frames);
                return Err(e.into());
            }
        };

        map_frames(pmd, start, &frames, pages, flags);
        debug!("mapped {pages} large pages at PMD slot {} -> {}", start.as_usize(), frames.phys());
        Ok(frames)
    }
}
