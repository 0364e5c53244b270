//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses used by the frame
//! allocator, the page-table walker and the guest bootstrapper.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Host-physical memory and page-aligned frame bases. |
//! | [`VirtualAddress`] | Addresses translated through the kernel page tables. |
//!
//! Two page granularities exist: [`Size4K`], the unit of the frame allocator,
//! and [`Size2M`], the only leaf size the kernel installs.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0020_0042);
//! assert_eq!(pa.align_down::<Size4K>().as_u64(), 0x0020_0000);
//! assert_eq!(pa.align_up::<Size2M>().unwrap().as_u64(), 0x0040_0000);
//! assert_eq!(pa.page::<Size2M>().base().as_u64(), 0x0020_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use page_size::{FRAMES_PER_LARGE_PAGE, PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        let a = PhysicalAddress::new(0x1234_5678);
        assert_eq!(a.align_down::<Size4K>().as_u64(), 0x1234_5000);
        assert_eq!(a.align_up::<Size4K>().unwrap().as_u64(), 0x1234_6000);
        assert_eq!(a.align_down::<Size2M>().as_u64(), 0x1220_0000);
        assert_eq!(a.offset::<Size4K>(), 0x678);
        assert!(!a.is_aligned::<Size4K>());

        let b = PhysicalAddress::new(0x0060_0000);
        assert_eq!(b.align_up::<Size2M>(), Some(b));
        assert!(b.is_aligned::<Size2M>());
    }

    #[test]
    fn align_up_overflow_is_none() {
        let top = PhysicalAddress::new(u64::MAX - 10);
        assert!(top.align_up::<Size4K>().is_none());
        assert!(top.checked_add(11).is_none());
    }

    #[test]
    fn pfn_round_trip() {
        let pa = PhysicalAddress::new(0x0110_0000);
        assert_eq!(pa.pfn(), 0x1100);
        assert_eq!(PhysicalAddress::from_pfn(pa.pfn()), pa);
    }

    #[test]
    fn large_page_is_512_frames() {
        assert_eq!(FRAMES_PER_LARGE_PAGE, 512);
        assert_eq!(Size2M::SIZE >> Size4K::SHIFT, FRAMES_PER_LARGE_PAGE);
    }

    #[test]
    fn physical_page_requires_alignment() {
        let aligned = PhysicalAddress::new(0x0080_0000);
        let pp = PhysicalPage::<Size2M>::new_aligned(aligned).unwrap();
        assert_eq!(PhysicalAddress::from(pp), aligned);
        assert!(PhysicalPage::<Size2M>::new_aligned(aligned + 0x1000).is_none());
        assert!(PhysicalPage::<Size4K>::new_aligned(aligned + 0x1000).is_some());
    }

    #[test]
    fn virtual_arithmetic() {
        let va = VirtualAddress::new(0xFFFF_FFFF_8000_1000);
        assert_eq!(va.checked_sub(0xFFFF_FFFF_8000_0000), Some(VirtualAddress::new(0x1000)));
        assert!(VirtualAddress::new(0xFFFF_FFFF_FFFF_F000).checked_add(0x1000).is_none());
        assert_eq!(format!("{va}"), "0xFFFFFFFF80001000");
    }
}
