//! # Kernel Page-Table Walker
//!
//! Locates the PGD, PUD and PMD that cover a kernel virtual address, starting
//! from a root frame (usually the live CR3). Table frames are reached through
//! a [`PhysMapper`].

use crate::entry::PageEntry;
use crate::table::{Level, Pgd, Pmd, Pud};
use crate::{PhysMapper, translate};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use log::trace;

/// Why a walk stopped before reaching the requested level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// The entry that should link to the next table is not present.
    #[error("{level} entry for {va} is not present")]
    NotPresent { level: Level, va: VirtualAddress },
    /// The entry maps a large page where a table link was expected.
    #[error("{level} entry for {va} is a large-page leaf, expected a table")]
    UnexpectedLeaf { level: Level, va: VirtualAddress },
}

/// The kernel's page tables, rooted at a PGD frame.
pub struct KernelPageTables<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> KernelPageTables<'m, M> {
    /// View the tables of the **currently active** address space.
    ///
    /// # Safety
    /// Must run at CPL0 with paging enabled, and `mapper` must reach every
    /// frame CR3 and its descendants point at.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[must_use]
    pub unsafe fn from_current(mapper: &'m M) -> Self {
        use kernel_registers::{Cr3, LoadRegisterUnsafe};

        let cr3 = unsafe { Cr3::load_unsafe() };
        Self::from_root(mapper, PhysicalPage::from_addr(cr3.pgd_phys()))
    }

    #[must_use]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// The top-level table.
    pub fn pgd(&mut self) -> &mut Pgd {
        unsafe { self.mapper.table_mut(self.root) }
    }

    /// The PUD covering the kernel offset.
    ///
    /// # Errors
    /// See [`WalkError`].
    pub fn pud(&mut self) -> Result<&mut Pud, WalkError> {
        self.pud_for(translate::kernel_offset())
    }

    /// The PMD covering the kernel offset, where kernel large pages go.
    ///
    /// # Errors
    /// See [`WalkError`].
    pub fn pmd(&mut self) -> Result<&mut Pmd, WalkError> {
        self.pmd_for(translate::kernel_offset())
    }

    /// The PUD covering `va`.
    ///
    /// # Errors
    /// See [`WalkError`].
    pub fn pud_for(&mut self, va: VirtualAddress) -> Result<&mut Pud, WalkError> {
        let e = self.pgd().get(Pgd::index_of(va));
        let next = descend(e, Level::Pgd, va)?;
        Ok(unsafe { self.mapper.table_mut(next) })
    }

    /// The PMD covering `va`.
    ///
    /// # Errors
    /// See [`WalkError`].
    pub fn pmd_for(&mut self, va: VirtualAddress) -> Result<&mut Pmd, WalkError> {
        let e = self.pud_for(va)?.get(Pud::index_of(va));
        let next = descend(e, Level::Pud, va)?;
        trace!("PMD for {va} at {}", next.base());
        Ok(unsafe { self.mapper.table_mut(next) })
    }
}

fn descend(
    e: PageEntry,
    level: Level,
    va: VirtualAddress,
) -> Result<PhysicalPage<Size4K>, WalkError> {
    if !e.present() {
        return Err(WalkError::NotPresent { level, va });
    }
    e.next_table()
        .ok_or(WalkError::UnexpectedLeaf { level, va })
}
