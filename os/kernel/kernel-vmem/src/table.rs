//! # Page-Table Levels
//!
//! The kernel walks three levels below CR3:
//!
//! | Level | Index bits | Role here |
//! |-------|------------|-----------|
//! | [`Pgd`] | 47..39 | top level, referenced by CR3 |
//! | [`Pud`] | 38..30 | links to the kernel PMD |
//! | [`Pmd`] | 29..21 | leaf level for 2 MiB pages |
//!
//! Every table is 512 [`PageEntry`] values in one 4 KiB-aligned frame.

use crate::entry::PageEntry;
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size2M, VirtualAddress};

/// Entries per table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// The paging level a table or index belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Level {
    Pgd,
    Pud,
    Pmd,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pgd => "PGD",
            Self::Pud => "PUD",
            Self::Pmd => "PMD",
        })
    }
}

macro_rules! page_table_level {
    ($(#[$meta:meta])* $table:ident, $index:ident, $level:expr, $shift:expr) => {
        #[doc = concat!("Index into a [`", stringify!($table), "`], VA bits starting at ", stringify!($shift), ".")]
        #[repr(transparent)]
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $index(u16);

        impl $index {
            /// Bit position of this level's index in a virtual address.
            pub const SHIFT: u32 = $shift;

            /// Extract the 9-bit index from `va`.
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn of(va: VirtualAddress) -> Self {
                Self(((va.as_u64() >> Self::SHIFT) & 0x1FF) as u16)
            }

            /// `None` if `i` is not a valid slot.
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub const fn new(i: usize) -> Option<Self> {
                if i < ENTRIES_PER_TABLE {
                    Some(Self(i as u16))
                } else {
                    None
                }
            }

            #[inline]
            #[must_use]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        $(#[$meta])*
        #[repr(C, align(4096))]
        pub struct $table {
            entries: [PageEntry; ENTRIES_PER_TABLE],
        }

        impl $table {
            pub const LEVEL: Level = $level;

            /// A table with every entry non-present.
            #[inline]
            #[must_use]
            pub const fn zeroed() -> Self {
                Self {
                    entries: [PageEntry::new(); ENTRIES_PER_TABLE],
                }
            }

            #[inline]
            #[must_use]
            pub const fn get(&self, i: $index) -> PageEntry {
                self.entries[i.as_usize()]
            }

            /// Plain store; TLB maintenance for live mappings is the caller's job.
            #[inline]
            pub const fn set(&mut self, i: $index, e: PageEntry) {
                self.entries[i.as_usize()] = e;
            }

            #[inline]
            #[must_use]
            pub const fn index_of(va: VirtualAddress) -> $index {
                $index::of(va)
            }

            /// The raw entry array.
            #[inline]
            #[must_use]
            pub const fn entries(&self) -> &[PageEntry; ENTRIES_PER_TABLE] {
                &self.entries
            }
        }

        impl Default for $table {
            fn default() -> Self {
                Self::zeroed()
            }
        }

        const _: () = assert!(core::mem::size_of::<$table>() == 4096);
    };
}

page_table_level!(
    /// Page Global Directory (PML4).
    Pgd, PgdIndex, Level::Pgd, 39
);
page_table_level!(
    /// Page Upper Directory (PDPT).
    Pud, PudIndex, Level::Pud, 30
);
page_table_level!(
    /// Page Middle Directory (PD), the leaf level for 2 MiB pages.
    Pmd, PmdIndex, Level::Pmd, 21
);

impl Pmd {
    /// Install `n` consecutive 2 MiB leaves starting at slot `start`.
    ///
    /// Slot `start + i` maps `first + i * 2 MiB`. The address bits of
    /// `flags` are ignored and `PS` is set on every entry.
    ///
    /// # Panics
    /// If `start + n` runs past the end of the table.
    pub fn map_large_pages(&mut self, start: PmdIndex, first: PhysicalPage<Size2M>, n: usize, flags: PageEntry) {
        let flags = flags.flags();
        let slots = &mut self.entries[start.as_usize()..start.as_usize() + n];
        let mut page = first;
        for slot in slots {
            *slot = PageEntry::large_leaf(page, flags);
            page = PhysicalPage::from_addr(page.base() + Size2M::SIZE);
        }
    }
}
