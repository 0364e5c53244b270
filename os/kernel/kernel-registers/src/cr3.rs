#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// CR3 with PCID disabled: the physical base of the top-level table (PGD)
/// plus its cache-control bits.
#[bitfield(u64)]
pub struct Cr3 {
    #[bits(3)]
    _reserved0: u8,

    /// Bit 3: Page-level Write-Through for PGD accesses.
    pub pwt: bool,

    /// Bit 4: Page-level Cache Disable for PGD accesses.
    pub pcd: bool,

    #[bits(7)]
    _reserved1: u8,

    /// Bits 12–51: PGD frame number.
    #[bits(40)]
    pgd_pfn: u64,

    #[bits(12)]
    _reserved2: u16,
}

impl Cr3 {
    #[must_use]
    pub const fn from_pgd(pgd: PhysicalPage<Size4K>) -> Self {
        Self::new().with_pgd_pfn(pgd.base().pfn())
    }

    /// Physical address of the top-level page table.
    #[must_use]
    pub const fn pgd_phys(&self) -> PhysicalAddress {
        PhysicalAddress::from_pfn(self.pgd_pfn())
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
