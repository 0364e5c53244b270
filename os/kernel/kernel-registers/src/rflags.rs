#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::LoadRegister;
use bitfield_struct::bitfield;

/// RFLAGS in 64-bit mode.
///
/// Bit 1 is fixed to one and the remaining reserved bits to zero, so
/// [`Rflags::new`] is the architectural reset value `0x2`.
#[bitfield(u64)]
pub struct Rflags {
    pub cf_carry: bool, // 0

    #[bits(default = true)]
    _always1: bool, // 1

    pub pf_parity: bool, // 2

    #[bits(1)]
    _rsvd3: bool, // 3

    pub af_adjust: bool, // 4

    #[bits(1)]
    _rsvd5: bool, // 5

    pub zf_zero: bool,             // 6
    pub sf_sign: bool,             // 7
    pub tf_trap: bool,             // 8
    pub if_interrupt_enable: bool, // 9
    pub df_direction: bool,        // 10
    pub of_overflow: bool,         // 11

    /// I/O privilege level.
    #[bits(2)]
    pub iopl: u8, // 12–13

    pub nt_nested: bool, // 14

    #[bits(1)]
    _rsvd15: bool, // 15

    pub rf_resume: bool,                     // 16
    pub vm_virtual_8086: bool,               // 17
    pub ac_alignment_check: bool,            // 18
    pub vif_virtual_interrupt: bool,         // 19
    pub vip_virtual_interrupt_pending: bool, // 20
    pub id_cpuid: bool,                      // 21

    #[bits(42)]
    _reserved_rest: u64,
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegister for Rflags {
    fn load() -> Self {
        let bits: u64;
        unsafe {
            core::arch::asm!("pushfq", "pop {}", out(reg) bits, options(preserves_flags));
        }
        Self::from_bits(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_value_is_two() {
        assert_eq!(Rflags::new().into_bits(), 0x2);
    }

    #[test]
    fn interrupt_flag_position() {
        let f = Rflags::new().with_if_interrupt_enable(true).with_iopl(3);
        assert_eq!(f.into_bits(), 0x2 | (1 << 9) | (3 << 12));
    }
}
