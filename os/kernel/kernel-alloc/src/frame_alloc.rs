//! # Physical Frame Allocator
//!
//! Hands out physically contiguous runs of 4 KiB frames from the usable zones
//! of the boot memory map. A 2 MiB large page is a 2 MiB-aligned run of
//! [`FRAMES_PER_LARGE_PAGE`] frames.
//!
//! ```text
//! ZoneCatalog ──memory_init──► FrameAllocator ──alloc_*──► PageFrames
//!                                    ▲                        │
//!                                    └──── release_frames ────┘
//! ```
//!
//! Free state is one bit per frame, so a release never needs room the
//! allocator does not already have.

use crate::frame_map::{FrameBitmap, FrameRun, MarkError, words_for};
use crate::zones::{ZoneCatalog, ZoneType};
use core::fmt;
use kernel_info::memory::LOW_MEMORY_END;
use kernel_memory_addresses::{FRAMES_PER_LARGE_PAGE, PageSize, PhysicalAddress, Size4K, VirtualAddress};
use kernel_vmem::phys_to_virt;
use log::{debug, info, trace};

/// Errors while building the frame pool from the memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("no memory map was provided")]
    NoMemoryMap,
    #[error("memory map is malformed")]
    MalformedMap,
    #[error("first frame address {0} lies in low memory")]
    KernelBelowLowMemory(PhysicalAddress),
    #[error("usable zones overlap")]
    OverlappingZones,
    #[error("no room for {words} words of frame metadata")]
    NoMetadataRoom { words: u64 },
    #[error("no usable frames above the kernel")]
    NoUsableFrames,
}

/// Errors returned by allocation requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("out of memory: no free run of {frames} frames")]
    OutOfMemory { frames: u64 },
}

/// An allocated run of physically contiguous frames.
///
/// Only the allocator creates one, and the only way to give the frames back
/// is to move it into [`FrameAllocator::release_frames`].
#[derive(PartialEq, Eq)]
#[must_use = "dropping PageFrames leaks the frames"]
pub struct PageFrames {
    pfn: u64,
    count: u64,
}

impl PageFrames {
    /// Frame number of the first frame.
    #[must_use]
    pub const fn pfn(&self) -> u64 {
        self.pfn
    }

    /// Number of frames in the run.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Physical address of the first frame.
    #[must_use]
    pub const fn phys(&self) -> PhysicalAddress {
        PhysicalAddress::from_pfn(self.pfn)
    }

    /// Direct-map address of the first frame.
    #[must_use]
    pub const fn vaddr(&self) -> VirtualAddress {
        phys_to_virt(self.phys())
    }

    /// Size of the run in bytes.
    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.count * Size4K::SIZE
    }
}

impl fmt::Debug for PageFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageFrames({} +{} frames)", self.phys(), self.count)
    }
}

/// Bitmap based allocator over 4 KiB frames.
///
/// `'m` is the lifetime of the bitmap storage.
pub struct FrameAllocator<'m> {
    map: FrameBitmap<'m>,
    free: u64,
    total: u64,
}

/// Build the frame pool from the usable zones of `zones`.
///
/// Every [`ZoneType::Usable`] zone is clipped to start at or after
/// `first_frame_addr` (the end of the kernel image) and rounded inward to
/// whole frames. The free bitmap is kept in the first frames of the lowest
/// usable run that can hold it; those frames are never handed out.
///
/// # Safety
/// The usable zones above `first_frame_addr` must be unused RAM reachable
/// through the direct map, and nothing but the returned allocator may touch
/// them afterwards.
///
/// # Errors
/// As [`memory_init_in`], and [`InitError::NoMetadataRoom`] if no usable run
/// can hold the bitmap.
pub unsafe fn memory_init(
    zones: &ZoneCatalog,
    first_frame_addr: PhysicalAddress,
) -> Result<FrameAllocator<'static>, InitError> {
    let span = usable_span(zones, first_frame_addr)?;
    let meta = metadata_frames(zones, first_frame_addr, words_for(span.count))?;
    let len = span_words(span)?;
    let ptr = phys_to_virt(PhysicalAddress::from_pfn(meta.pfn)).as_mut_ptr::<u64>();
    // SAFETY: `meta` lies in usable RAM behind the direct map and the caller
    // hands it to this allocator alone.
    let storage = unsafe { core::slice::from_raw_parts_mut(ptr, len) };
    build(zones, first_frame_addr, storage, Some(meta))
}

/// Build the frame pool with its free bitmap in `metadata`.
///
/// The pool covers exactly the clipped usable zones; see
/// [`metadata_words`] for the storage it needs.
///
/// # Errors
/// - [`InitError::KernelBelowLowMemory`] if `first_frame_addr` is below 1 MiB.
/// - [`InitError::MalformedMap`] if a usable zone wraps the address space.
/// - [`InitError::OverlappingZones`] if two usable zones share frames.
/// - [`InitError::NoMetadataRoom`] if `metadata` is too short.
/// - [`InitError::NoUsableFrames`] if nothing is left.
pub fn memory_init_in<'m>(
    zones: &ZoneCatalog,
    first_frame_addr: PhysicalAddress,
    metadata: &'m mut [u64],
) -> Result<FrameAllocator<'m>, InitError> {
    build(zones, first_frame_addr, metadata, None)
}

/// Bitmap words [`memory_init_in`] needs for `zones` above `first_frame_addr`.
///
/// # Errors
/// As [`memory_init_in`], short of [`InitError::OverlappingZones`] and
/// [`InitError::NoMetadataRoom`].
pub fn metadata_words(zones: &ZoneCatalog, first_frame_addr: PhysicalAddress) -> Result<usize, InitError> {
    span_words(usable_span(zones, first_frame_addr)?)
}

fn build<'m>(
    zones: &ZoneCatalog,
    first_frame_addr: PhysicalAddress,
    metadata: &'m mut [u64],
    carved: Option<FrameRun>,
) -> Result<FrameAllocator<'m>, InitError> {
    let span = usable_span(zones, first_frame_addr)?;
    let map = FrameBitmap::new(metadata, span.pfn, span.end()).ok_or(InitError::NoMetadataRoom {
        words: words_for(span.count),
    })?;
    let mut alloc = FrameAllocator { map, free: 0, total: 0 };

    for run in usable_runs(zones, first_frame_addr) {
        let run = run?;
        debug!(
            "usable frames {}..{} ({} frames)",
            PhysicalAddress::from_pfn(run.pfn),
            PhysicalAddress::from_pfn(run.end()),
            run.count
        );
        alloc
            .map
            .mark_free(run.pfn, run.count)
            .map_err(|_| InitError::OverlappingZones)?;
        alloc.free += run.count;
    }

    if let Some(meta) = carved {
        debug!("frame bitmap at {} ({} frames)", PhysicalAddress::from_pfn(meta.pfn), meta.count);
        alloc.map.mark_used(meta.pfn, meta.count);
        alloc.free -= meta.count;
    }

    alloc.total = alloc.free;
    if alloc.total == 0 {
        return Err(InitError::NoUsableFrames);
    }

    info!(
        "frame allocator: {} frames ({} MiB) in {} runs",
        alloc.total,
        (alloc.total * Size4K::SIZE) >> 20,
        alloc.map.runs().count()
    );
    Ok(alloc)
}

/// Usable zones clipped to `first_frame_addr` and rounded inward to whole
/// frames, in firmware order. Zones left empty are skipped.
fn usable_runs(
    zones: &ZoneCatalog,
    first_frame_addr: PhysicalAddress,
) -> impl Iterator<Item = Result<FrameRun, InitError>> + '_ {
    zones
        .zones()
        .iter()
        .filter(|z| z.ty == ZoneType::Usable)
        .filter_map(move |zone| {
            let Some(end) = zone.end() else {
                return Some(Err(InitError::MalformedMap));
            };
            let start = PhysicalAddress::new(zone.start.max(first_frame_addr.as_u64())).align_up::<Size4K>()?;
            let end = PhysicalAddress::new(end).align_down::<Size4K>();
            if start >= end {
                return None;
            }
            Some(Ok(FrameRun {
                pfn: start.pfn(),
                count: end.pfn() - start.pfn(),
            }))
        })
}

/// Frames from the lowest to the highest usable frame.
fn usable_span(zones: &ZoneCatalog, first_frame_addr: PhysicalAddress) -> Result<FrameRun, InitError> {
    if first_frame_addr.as_u64() < LOW_MEMORY_END {
        return Err(InitError::KernelBelowLowMemory(first_frame_addr));
    }

    let mut span: Option<(u64, u64)> = None;
    for run in usable_runs(zones, first_frame_addr) {
        let run = run?;
        let (lo, hi) = span.unwrap_or((run.pfn, run.end()));
        span = Some((lo.min(run.pfn), hi.max(run.end())));
    }
    let (lo, hi) = span.ok_or(InitError::NoUsableFrames)?;
    Ok(FrameRun { pfn: lo, count: hi - lo })
}

fn span_words(span: FrameRun) -> Result<usize, InitError> {
    usize::try_from(words_for(span.count)).map_err(|_| InitError::MalformedMap)
}

/// The first frames of the lowest usable run that holds `words` bitmap words.
fn metadata_frames(
    zones: &ZoneCatalog,
    first_frame_addr: PhysicalAddress,
    words: u64,
) -> Result<FrameRun, InitError> {
    let count = (words * 8).div_ceil(Size4K::SIZE);
    let mut lowest: Option<FrameRun> = None;
    for run in usable_runs(zones, first_frame_addr) {
        let run = run?;
        if run.count >= count && lowest.is_none_or(|l| run.pfn < l.pfn) {
            lowest = Some(run);
        }
    }
    lowest
        .map(|run| FrameRun { pfn: run.pfn, count })
        .ok_or(InitError::NoMetadataRoom { words })
}

impl FrameAllocator<'_> {
    /// Allocate `n` physically contiguous frames, first fit by address.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if `n` is zero or no run is long enough.
    /// The pool is unchanged in that case.
    pub fn alloc_frames(&mut self, n: u64) -> Result<PageFrames, AllocError> {
        self.take(n, 1)
    }

    /// Allocate a single frame.
    ///
    /// # Errors
    /// See [`alloc_frames`](Self::alloc_frames).
    pub fn alloc_frame(&mut self) -> Result<PageFrames, AllocError> {
        self.alloc_frames(1)
    }

    /// Allocate backing for `pages` 2 MiB large pages: a 2 MiB-aligned run of
    /// `pages * 512` frames.
    ///
    /// # Errors
    /// [`AllocError::OutOfMemory`] if `pages` is zero or no aligned run fits.
    pub fn alloc_large_frames(&mut self, pages: u64) -> Result<PageFrames, AllocError> {
        let frames = pages
            .checked_mul(FRAMES_PER_LARGE_PAGE)
            .ok_or(AllocError::OutOfMemory { frames: u64::MAX })?;
        self.take(frames, FRAMES_PER_LARGE_PAGE)
    }

    fn take(&mut self, frames: u64, align: u64) -> Result<PageFrames, AllocError> {
        let pfn = self
            .map
            .find_free(frames, align)
            .ok_or(AllocError::OutOfMemory { frames })?;
        self.map.mark_used(pfn, frames);
        self.free -= frames;
        trace!("alloc {frames} frames at pfn {pfn:#x}");
        Ok(PageFrames { pfn, count: frames })
    }

    /// Return a run to the pool.
    ///
    /// # Panics
    /// If any of the frames is already free (double release).
    #[allow(clippy::needless_pass_by_value)]
    pub fn release_frames(&mut self, frames: PageFrames) {
        let PageFrames { pfn, count } = frames;
        trace!("release {count} frames at pfn {pfn:#x}");
        match self.map.mark_free(pfn, count) {
            Ok(()) => self.free += count,
            Err(MarkError::AlreadyFree(frame)) => {
                panic!("double release of frame {frame:#x} in {pfn:#x}+{count}")
            }
            Err(MarkError::OutOfRange) => {
                panic!("frames {pfn:#x}+{count} are outside the pool")
            }
        }
    }

    /// Return a single frame.
    ///
    /// # Panics
    /// As [`release_frames`](Self::release_frames).
    pub fn release_frame(&mut self, frame: PageFrames) {
        debug_assert_eq!(frame.count(), 1);
        self.release_frames(frame);
    }

    /// Frames currently free.
    #[must_use]
    pub const fn free_frames(&self) -> u64 {
        self.free
    }

    /// Frames the pool was created with.
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total
    }

    /// The free runs, in address order.
    pub fn free_runs(&self) -> impl Iterator<Item = FrameRun> + '_ {
        self.map.runs()
    }
}

impl fmt::Debug for FrameAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAllocator")
            .field("total", &self.total)
            .field("free", &self.free_frames())
            .field("runs", &self.free_runs().count())
            .finish()
    }
}
