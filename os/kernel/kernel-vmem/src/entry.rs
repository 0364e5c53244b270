//! # Page-Table Entries
//!
//! One 64-bit layout is shared by the PGD, PUD and PMD levels. Bit 7 (`PS`)
//! decides whether a PUD/PMD entry points at the next table or is a leaf.

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size2M, Size4K};

/// A single x86-64 paging-structure entry.
///
/// The frame field is private: an address can only enter an entry through a
/// [`PhysicalPage`], so it is page aligned by construction, and
/// [`PageEntry::flags`] strips it back out.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntry {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User accessible (bit 2).
    pub user: bool,
    /// Page-level write-through (bit 3).
    pub write_through: bool,
    /// Page-level cache disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5), set by the CPU.
    pub accessed: bool,
    /// Dirty (bit 6), leaf entries only.
    pub dirty: bool,
    /// Page size (bit 7): this PUD/PMD entry is a leaf.
    pub large_page: bool,
    /// Global (bit 8), leaf entries only.
    pub global: bool,

    #[bits(3)]
    pub os_available_low: u8,

    /// Bits 12–51, the 4 KiB frame number.
    #[bits(40)]
    frame: u64,

    #[bits(7)]
    pub os_available_high: u8,
    #[bits(4)]
    pub protection_key: u8,
    /// No-execute (bit 63).
    pub no_execute: bool,
}

impl PageEntry {
    /// Present and writable, for links to a next-level table.
    #[must_use]
    pub const fn kernel_table() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, writable, global 2 MiB leaf flags.
    #[must_use]
    pub const fn kernel_large_rw() -> Self {
        Self::kernel_table().with_large_page(true).with_global(true)
    }

    /// Only the flag bits of this entry; the address field is cleared.
    #[must_use]
    pub const fn flags(self) -> Self {
        self.with_frame(0)
    }

    /// Link to the next-level table at `next`. `PS` is forced off.
    #[must_use]
    pub const fn table(next: PhysicalPage<Size4K>, flags: Self) -> Self {
        flags
            .with_frame(next.base().pfn())
            .with_large_page(false)
    }

    /// 2 MiB leaf mapping `page`. `PS` is forced on.
    #[must_use]
    pub const fn large_leaf(page: PhysicalPage<Size2M>, flags: Self) -> Self {
        flags
            .with_frame(page.base().pfn())
            .with_large_page(true)
    }

    /// The physical address held in the entry, with all flag bits masked.
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress::from_pfn(self.frame())
    }

    /// The next-level table, if this entry is present and not a leaf.
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        if self.present() && !self.large_page() {
            Some(PhysicalPage::from_addr(self.address()))
        } else {
            None
        }
    }

    /// The mapped 2 MiB page, if this entry is a present leaf.
    #[must_use]
    pub const fn large_page_base(self) -> Option<PhysicalPage<Size2M>> {
        if self.present() && self.large_page() {
            Some(PhysicalPage::from_addr(self.address()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_leaf_is_phys_or_flags() {
        let page = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x0040_0000));
        let e = PageEntry::large_leaf(page, PageEntry::kernel_large_rw());
        assert_eq!(e.into_bits(), 0x0040_0000 | 0x1 | 0x2 | 0x80 | 0x100);
        assert_eq!(e.large_page_base(), Some(page));
        assert_eq!(e.next_table(), None);
    }

    #[test]
    fn flags_never_leak_into_address() {
        let dirty_flags = PageEntry::from_bits(0xDEAD_B000 | 0x3);
        let page = PhysicalPage::<Size2M>::from_addr(PhysicalAddress::new(0x0060_0000));
        let e = PageEntry::large_leaf(page, dirty_flags.flags());
        assert_eq!(e.address().as_u64(), 0x0060_0000);
        assert!(e.present() && e.writable());
    }

    #[test]
    fn table_link_clears_ps() {
        let pt = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x0010_3000));
        let e = PageEntry::table(pt, PageEntry::kernel_large_rw());
        assert!(!e.large_page());
        assert_eq!(e.next_table(), Some(pt));
    }

    #[test]
    fn non_present_has_no_target() {
        let e = PageEntry::from_bits(0x0010_3000);
        assert_eq!(e.next_table(), None);
        assert_eq!(e.large_page_base(), None);
    }
}
