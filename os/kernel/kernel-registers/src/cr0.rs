#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR0 in 64-bit mode. Reserved bits are private and stay zero.
#[bitfield(u64)]
pub struct Cr0 {
    /// Bit 0: Protection Enable (PE).
    pub pe_protection_enable: bool,
    /// Bit 1: Monitor Coprocessor (MP).
    pub mp_monitor_coprocessor: bool,
    /// Bit 2: Emulation (EM).
    pub em_emulation: bool,
    /// Bit 3: Task Switched (TS).
    pub ts_task_switched: bool,
    /// Bit 4: Extension Type (ET).
    pub et_extension_type: bool,
    /// Bit 5: Numeric Error (NE).
    pub ne_numeric_error: bool,

    #[bits(10)]
    _reserved_6_15: u16,

    /// Bit 16: Write Protect (WP).
    pub wp_write_protect: bool,

    #[bits(1)]
    _reserved_17: bool,

    /// Bit 18: Alignment Mask (AM).
    pub am_alignment_mask: bool,

    #[bits(10)]
    _reserved_19_28: u16,

    /// Bit 29: Not-Write-Through (NW).
    pub nw_not_write_through: bool,
    /// Bit 30: Cache Disable (CD).
    pub cd_cache_disable: bool,
    /// Bit 31: Paging (PG).
    pub pg_paging: bool,

    #[bits(32)]
    _reserved_32_63: u32,
}

impl Cr0 {
    /// Protected mode without paging: only PE set.
    ///
    /// This is the CR0 a freshly bootstrapped guest starts with.
    #[must_use]
    pub const fn protected_mode() -> Self {
        Self::new().with_pe_protection_enable(true)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let cr0: u64;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_mode_is_only_pe() {
        let cr0 = Cr0::protected_mode();
        assert_eq!(cr0.into_bits(), 1);
        assert!(!cr0.pg_paging());
    }

    #[test]
    fn paging_bit_position() {
        assert_eq!(Cr0::new().with_pg_paging(true).into_bits(), 1 << 31);
        assert_eq!(Cr0::new().with_wp_write_protect(true).into_bits(), 1 << 16);
    }
}
