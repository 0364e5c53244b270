//! # Kernel Virtual Memory
//!
//! Address translation and the kernel page-table walker.
//!
//! - [`translate`]: the fixed kernel views of physical memory
//!   ([`virt_to_phys`], [`phys_to_virt`], [`va`]).
//! - [`PageEntry`] and the [`Pgd`] / [`Pud`] / [`Pmd`] tables.
//! - [`KernelPageTables`]: finds the PMD that covers a kernel address.
//! - [`PhysMapper`]: how table frames become references.
//!
//! ## Virtual address layout
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒0          |
//! |  PGD  |  PUD  |  PMD  | 2 MiB offset  |
//! ```
//!
//! Kernel mappings stop at the PMD: every leaf is a 2 MiB page with `PS=1`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod entry;
pub mod table;
pub mod translate;
pub mod walker;

pub use crate::entry::PageEntry;
pub use crate::table::{ENTRIES_PER_TABLE, Level, Pgd, PgdIndex, Pmd, PmdIndex, Pud, PudIndex};
pub use crate::translate::{direct_map_range, kernel_offset, phys_to_virt, va, virt_to_phys};
pub use crate::walker::{KernelPageTables, WalkError};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Turns physical addresses into references in the current address space.
///
/// The kernel goes through the direct map; tests back "physical memory" with
/// heap frames.
pub trait PhysMapper {
    /// # Safety
    /// - `pa` must be mapped writable for the whole lifetime `'a`.
    /// - The bytes at `pa` must be a valid `T`, and no other reference to
    ///   them may be live.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// Borrow the paging structure stored in frame `page`.
    ///
    /// # Safety
    /// As [`phys_to_mut`](Self::phys_to_mut); the frame must hold a table.
    #[inline]
    unsafe fn table_mut<'a, T>(&self, page: PhysicalPage<Size4K>) -> &'a mut T {
        unsafe { self.phys_to_mut::<T>(page.base()) }
    }
}
