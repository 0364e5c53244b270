//! # Segment selectors
//!
//! ```text
//!  15            3 2  1  0
//! +----------------+--+----+
//! |   Index[12:0]  |TI| RPL|
//! +----------------+--+----+  (TI=0 → GDT, TI=1 → LDT; RPL=0..3)
//! ```

use bitfield_struct::bitfield;

/// Which descriptor table a selector addresses.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Table {
    /// Global Descriptor Table
    Gdt = 0,
    /// Local Descriptor Table
    Ldt = 1,
}

impl Table {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        if bits == 0 { Self::Gdt } else { Self::Ldt }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// A 16-bit segment selector as loaded into CS/DS/SS/ES.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct SegmentSelector {
    /// Requested Privilege Level (bits 0..1).
    #[bits(2)]
    pub rpl: u8,
    /// Table Indicator (bit 2).
    #[bits(1)]
    pub ti: Table,
    /// Descriptor index (bits 3..15).
    #[bits(13)]
    pub index: u16,
}

impl SegmentSelector {
    /// Selector of GDT entry `index` at RPL 0.
    #[inline]
    #[must_use]
    pub const fn gdt(index: u16) -> Self {
        Self::new().with_index(index).with_ti(Table::Gdt)
    }

    /// The GDT/LDT slot this selector names.
    #[inline]
    #[must_use]
    pub fn slot(self) -> usize {
        usize::from(self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_layout() {
        let s = SegmentSelector::from_bits(0x2B);
        assert_eq!(s.rpl(), 3);
        assert_eq!(s.ti(), Table::Gdt);
        assert_eq!(s.index(), 5);

        assert_eq!(SegmentSelector::gdt(1).into_bits(), 0x08);
        assert_eq!(SegmentSelector::gdt(2).slot(), 2);
        assert_eq!(SegmentSelector::from_bits(0x0C).ti(), Table::Ldt);
    }
}
