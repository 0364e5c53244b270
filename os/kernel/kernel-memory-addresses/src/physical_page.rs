use crate::{MemoryAddress, PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Page-aligned base of a physical page of size `S`.
///
/// The low `S::SHIFT` bits of the base are always zero. Page-table entries
/// only ever accept a `PhysicalPage`, so an unaligned frame address can not
/// end up in an entry's address field.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pp = PhysicalAddress::new(0x0040_1234).page::<Size2M>();
/// assert_eq!(pp.base().as_u64(), 0x0040_0000);
/// assert!(PhysicalPage::<Size2M>::new_aligned(PhysicalAddress::new(0x0040_1000)).is_none());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: MemoryAddress,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// The page containing `pa` (rounded down).
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.0.align_down::<S>(),
            _size: PhantomData,
        }
    }

    /// Wrap `pa` only if it already is an `S` boundary.
    #[inline]
    #[must_use]
    pub const fn new_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::from_addr(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.base)
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.base.as_u64())
    }
}
