//! # Host GDT code/data descriptors
//!
//! The 8-byte legacy layout of a code or data segment descriptor as it sits
//! in the host GDT:
//!
//! ```text
//!  63      56 55 54 53 52 51    48 47 46 45 44 43  40 39      32
//! +----------+--+--+--+--+--------+--+-----+--+------+----------+
//! | base_hi  |G |DB|L |AV|limit_hi|P | DPL |S | type | base_mid |
//! +----------+--+--+--+--+--------+--+-----+--+------+----------+
//!  31                            16 15                          0
//! +--------------------------------+----------------------------+
//! |            base_lo             |          limit_lo          |
//! +--------------------------------+----------------------------+
//! ```
//!
//! Base and limit are split across the descriptor; [`GdtDescriptor::base`]
//! and [`GdtDescriptor::limit`] put them back together.

use bitfield_struct::bitfield;

/// A single code or data descriptor of the host GDT.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct GdtDescriptor {
    pub limit_lo: u16, // [15:0]
    pub base_lo: u16,  // [31:16]
    pub base_mid: u8,  // [39:32]
    #[bits(4)]
    pub typ: u8, // [43:40]
    pub s: bool,       // [44]     1 = code/data
    #[bits(2)]
    pub dpl: u8, // [46:45]
    pub p: bool,       // [47]
    #[bits(4)]
    pub limit_hi: u8, // [51:48]
    pub avl: bool,     // [52]
    pub l: bool,       // [53]
    pub db: bool,      // [54]
    pub g: bool,       // [55]
    pub base_hi: u8,   // [63:56]
}

impl GdtDescriptor {
    /// 64-bit ring-0 code: execute/read, `L=1`, `DB=0`.
    #[must_use]
    pub const fn kernel_code() -> Self {
        Self::new()
            .with_typ(0b1010)
            .with_s(true)
            .with_p(true)
            .with_l(true)
    }

    /// Ring-0 read/write data, flat 4 GiB.
    #[must_use]
    pub const fn kernel_data() -> Self {
        Self::new()
            .with_limit_lo(0xFFFF)
            .with_limit_hi(0xF)
            .with_typ(0b0010)
            .with_s(true)
            .with_p(true)
            .with_db(true)
            .with_g(true)
    }

    /// The 32-bit segment base, `base_hi:base_mid:base_lo`.
    #[must_use]
    pub fn base(self) -> u64 {
        u64::from(self.base_lo()) | (u64::from(self.base_mid()) << 16) | (u64::from(self.base_hi()) << 24)
    }

    /// The raw 20-bit limit, `limit_hi:limit_lo`. Granularity is not applied.
    #[must_use]
    pub fn limit(self) -> u32 {
        u32::from(self.limit_lo()) | (u32::from(self.limit_hi()) << 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fields_reassemble() {
        let d = GdtDescriptor::new()
            .with_base_lo(0x1234)
            .with_base_mid(0x56)
            .with_base_hi(0x78)
            .with_limit_lo(0xABCD)
            .with_limit_hi(0x9);
        assert_eq!(d.base(), 0x7856_1234);
        assert_eq!(d.limit(), 0x9_ABCD);
    }

    #[test]
    fn field_positions() {
        let d = GdtDescriptor::from_bits(0x00AF_9A00_0000_FFFF);
        assert_eq!(d.limit_lo(), 0xFFFF);
        assert_eq!(d.typ(), 0b1010);
        assert!(d.s());
        assert_eq!(d.dpl(), 0);
        assert!(d.p());
        assert_eq!(d.limit_hi(), 0xF);
        assert!(d.l());
        assert!(!d.db());
        assert!(d.g());
    }

    #[test]
    fn canned_descriptors() {
        assert_eq!(GdtDescriptor::kernel_code().into_bits(), 0x0020_9A00_0000_0000);
        assert_eq!(GdtDescriptor::kernel_data().into_bits(), 0x00CF_9200_0000_FFFF);
    }
}
