//! Per-frame free state.
//!
//! ```text
//!  pfn    base                                   end
//!          │                                      │
//!  bits    1 1 1 0 0 0 1 1 0 0 0 0 1 1 1 1 ...    ▼     1 = free
//!          └─run─┘     └run┘       └──run──...
//! ```
//!
//! One bit per frame from the lowest to the highest usable frame. Frames in
//! holes of the memory map are never set. Releasing a run only sets bits, so
//! it never needs storage the map does not already have.

/// Frames tracked per bitmap word.
const BITS: u64 = 64;

/// `count` free frames starting at frame number `pfn`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameRun {
    pub pfn: u64,
    pub count: u64,
}

impl FrameRun {
    /// First frame after the run.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.pfn + self.count
    }
}

/// `u64` words needed to track `frames` frames.
#[must_use]
pub const fn words_for(frames: u64) -> u64 {
    frames.div_ceil(BITS)
}

/// Why a run could not be marked free.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MarkError {
    /// Part of the run lies outside the tracked frames.
    OutOfRange,
    /// This frame of the run is already free.
    AlreadyFree(u64),
}

/// Free bits for the frames `base..end`, stored in borrowed words.
pub struct FrameBitmap<'m> {
    words: &'m mut [u64],
    base: u64,
    end: u64,
}

impl<'m> FrameBitmap<'m> {
    /// Track frames `base..end` with every frame allocated.
    ///
    /// Returns `None` if `words` is shorter than [`words_for`] the span.
    #[must_use]
    pub fn new(words: &'m mut [u64], base: u64, end: u64) -> Option<Self> {
        let needed = usize::try_from(words_for(end.checked_sub(base)?)).ok()?;
        let words = words.get_mut(..needed)?;
        words.fill(0);
        Some(Self { words, base, end })
    }

    /// Word index and bit mask of a tracked frame.
    #[allow(clippy::cast_possible_truncation)]
    const fn slot(&self, pfn: u64) -> (usize, u64) {
        let bit = pfn - self.base;
        // Below `words.len()`, which is a usize.
        ((bit / BITS) as usize, 1 << (bit % BITS))
    }

    #[must_use]
    pub fn is_free(&self, pfn: u64) -> bool {
        if pfn < self.base || pfn >= self.end {
            return false;
        }
        let (word, mask) = self.slot(pfn);
        self.words[word] & mask != 0
    }

    /// Mark `pfn..pfn + count` free.
    ///
    /// # Errors
    /// [`MarkError`] if the run leaves the map or a frame is already free;
    /// nothing changes then.
    pub fn mark_free(&mut self, pfn: u64, count: u64) -> Result<(), MarkError> {
        let end = pfn
            .checked_add(count)
            .filter(|&end| pfn >= self.base && end <= self.end)
            .ok_or(MarkError::OutOfRange)?;
        if let Some(taken) = (pfn..end).find(|&p| self.is_free(p)) {
            return Err(MarkError::AlreadyFree(taken));
        }
        for p in pfn..end {
            let (word, mask) = self.slot(p);
            self.words[word] |= mask;
        }
        Ok(())
    }

    /// Mark `pfn..pfn + count` allocated. The run must be tracked and free.
    pub fn mark_used(&mut self, pfn: u64, count: u64) {
        debug_assert!(pfn >= self.base && pfn + count <= self.end);
        for p in pfn..pfn + count {
            let (word, mask) = self.slot(p);
            debug_assert!(self.words[word] & mask != 0, "frame {p:#x} is not free");
            self.words[word] &= !mask;
        }
    }

    /// Lowest `count` consecutive free frames whose first frame number is a
    /// multiple of `align`.
    #[must_use]
    pub fn find_free(&self, count: u64, align: u64) -> Option<u64> {
        if count == 0 {
            return None;
        }
        let mut pfn = self.base.checked_next_multiple_of(align)?;
        loop {
            let end = pfn.checked_add(count).filter(|&end| end <= self.end)?;
            // Scanning from the top finds the last busy frame, so the next
            // candidate can skip past it.
            match (pfn..end).rev().find(|&p| !self.is_free(p)) {
                None => return Some(pfn),
                Some(busy) => pfn = (busy + 1).checked_next_multiple_of(align)?,
            }
        }
    }

    /// Maximal free runs in address order.
    pub fn runs(&self) -> impl Iterator<Item = FrameRun> + '_ {
        let mut next = self.base;
        core::iter::from_fn(move || {
            let pfn = (next..self.end).find(|&p| self.is_free(p))?;
            let end = (pfn..self.end).find(|&p| !self.is_free(p)).unwrap_or(self.end);
            next = end;
            Some(FrameRun { pfn, count: end - pfn })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(m: &FrameBitmap<'_>) -> Vec<(u64, u64)> {
        m.runs().map(|r| (r.pfn, r.count)).collect()
    }

    #[test]
    fn starts_fully_allocated() {
        let mut words = [u64::MAX; 4];
        let m = FrameBitmap::new(&mut words, 0x100, 0x180).unwrap();
        assert!(runs(&m).is_empty());
        assert!(!m.is_free(0x100));
        assert_eq!(m.find_free(1, 1), None);
    }

    #[test]
    fn short_storage_is_rejected() {
        let mut words = [0; 1];
        assert!(FrameBitmap::new(&mut words, 0, 65).is_none());
        assert!(FrameBitmap::new(&mut words, 0, 64).is_some());
        assert_eq!(words_for(65), 2);
    }

    #[test]
    fn adjacent_releases_read_back_as_one_run() {
        let mut words = [0; 8];
        let mut m = FrameBitmap::new(&mut words, 0x100, 0x300).unwrap();
        m.mark_free(0x140, 0x40).unwrap();
        m.mark_free(0x100, 0x40).unwrap();
        m.mark_free(0x200, 0x10).unwrap();
        assert_eq!(runs(&m), [(0x100, 0x80), (0x200, 0x10)]);
    }

    #[test]
    fn overlap_and_out_of_range_change_nothing() {
        let mut words = [0; 4];
        let mut m = FrameBitmap::new(&mut words, 0x100, 0x200).unwrap();
        m.mark_free(0x110, 4).unwrap();
        assert_eq!(m.mark_free(0x10e, 4), Err(MarkError::AlreadyFree(0x110)));
        assert_eq!(m.mark_free(0xff, 1), Err(MarkError::OutOfRange));
        assert_eq!(m.mark_free(0x1ff, 2), Err(MarkError::OutOfRange));
        assert_eq!(runs(&m), [(0x110, 4)]);
    }

    #[test]
    fn find_free_is_first_fit_by_address() {
        let mut words = [0; 16];
        let mut m = FrameBitmap::new(&mut words, 0x100, 0x401).unwrap();
        m.mark_free(0x100, 4).unwrap();
        m.mark_free(0x201, 0x200).unwrap();

        assert_eq!(m.find_free(3, 1), Some(0x100));
        assert_eq!(m.find_free(5, 1), Some(0x201));
        assert_eq!(m.find_free(0x200, 1), Some(0x201));
        assert_eq!(m.find_free(0x201, 1), None);
        assert_eq!(m.find_free(0, 1), None);
        assert_eq!(runs(&m), [(0x100, 4), (0x201, 0x200)]);
    }

    #[test]
    fn find_free_honors_alignment() {
        let mut words = [0; 40];
        let mut m = FrameBitmap::new(&mut words, 0x101, 0x900).unwrap();
        m.mark_free(0x101, 0x7ff).unwrap();
        assert_eq!(m.find_free(512, 512), Some(0x200));
        assert_eq!(m.find_free(0x600, 512), Some(0x200));
        assert_eq!(m.find_free(0x800, 512), None);
    }

    #[test]
    fn mark_used_splits_runs() {
        let mut words = [0; 4];
        let mut m = FrameBitmap::new(&mut words, 0, 0x100).unwrap();
        m.mark_free(0, 0x100).unwrap();
        m.mark_used(0x10, 0x20);
        assert_eq!(runs(&m), [(0, 0x10), (0x30, 0xd0)]);
        assert_eq!(m.find_free(0x11, 1), Some(0x30));
    }

    #[test]
    fn many_holes_need_no_extra_storage() {
        let mut words = [0; 32];
        let mut m = FrameBitmap::new(&mut words, 0, 0x800).unwrap();
        for pfn in (0..0x400).step_by(2) {
            m.mark_free(pfn, 1).unwrap();
        }
        assert_eq!(m.runs().count(), 0x200);
        assert_eq!(m.find_free(2, 1), None);
        m.mark_free(0x400, 0x400).unwrap();
        assert_eq!(m.find_free(512, 512), Some(0x400));
    }
}
