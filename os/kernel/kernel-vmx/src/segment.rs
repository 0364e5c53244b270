//! # Guest segment state
//!
//! A guest segment register as the VMCS stores it: selector, base, limit and a
//! 32-bit access-rights word, tagged with the guest field group it belongs to.

use crate::descriptor::GdtDescriptor;
use crate::guest_state::VmcsField;
use crate::selectors::SegmentSelector;
use bitfield_struct::bitfield;
use core::fmt;

/// VMCS guest segment access rights (Intel SDM Vol. 3, 24.4.1).
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct AccessRights {
    #[bits(4)]
    pub typ: u8, // [3:0]
    pub s: bool, // [4]
    #[bits(2)]
    pub dpl: u8, // [6:5]
    pub p: bool, // [7]
    #[bits(4)]
    _reserved_8_11: u8,
    pub avl: bool, // [12]
    pub l: bool,   // [13]
    pub db: bool,  // [14]
    pub g: bool,   // [15]
    /// Bit 16.
    pub usable: bool,
    #[bits(15)]
    _reserved_17_31: u16,
}

/// Guest segment register, and with it the group of four VMCS fields
/// (selector, limit, access rights, base) describing it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GuestSegmentField {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
    Ldtr = 6,
    Tr = 7,
}

impl GuestSegmentField {
    #[inline]
    const fn offset(self) -> u32 {
        2 * self as u32
    }

    #[must_use]
    pub const fn selector(self) -> VmcsField {
        VmcsField(0x0800 + self.offset())
    }

    #[must_use]
    pub const fn limit(self) -> VmcsField {
        VmcsField(0x4800 + self.offset())
    }

    #[must_use]
    pub const fn access_rights(self) -> VmcsField {
        VmcsField(0x4814 + self.offset())
    }

    #[must_use]
    pub const fn base(self) -> VmcsField {
        VmcsField(0x6806 + self.offset())
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Es => "es",
            Self::Cs => "cs",
            Self::Ss => "ss",
            Self::Ds => "ds",
            Self::Fs => "fs",
            Self::Gs => "gs",
            Self::Ldtr => "ldtr",
            Self::Tr => "tr",
        }
    }
}

impl fmt::Display for GuestSegmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Guest view of one segment register.
///
/// Only [`from_host`](Self::from_host) and [`deferred`](Self::deferred)
/// produce values; the fields are read-only afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentDescriptor {
    selector: SegmentSelector,
    base: u64,
    limit: u32,
    access: AccessRights,
    field: GuestSegmentField,
}

impl SegmentDescriptor {
    /// Convert the host descriptor `desc`, found through `selector`, into
    /// the guest's view of segment `field`.
    ///
    /// Type, S, DPL, P, AVL, D/B and G are copied; L is cleared and bit 16 is
    /// set. The limit is taken raw, granularity is not applied.
    #[must_use]
    pub fn from_host(desc: GdtDescriptor, selector: SegmentSelector, field: GuestSegmentField) -> Self {
        let access = AccessRights::new()
            .with_typ(desc.typ())
            .with_s(desc.s())
            .with_dpl(desc.dpl())
            .with_p(desc.p())
            .with_avl(desc.avl())
            .with_l(false)
            .with_db(desc.db())
            .with_g(desc.g())
            .with_usable(true);

        Self {
            selector,
            base: desc.base(),
            limit: desc.limit(),
            access,
            field,
        }
    }

    /// A descriptor carrying only its field tag. Selector, base, limit and
    /// access rights are zero until something fills them in.
    #[must_use]
    pub const fn deferred(field: GuestSegmentField) -> Self {
        Self {
            selector: SegmentSelector::new(),
            base: 0,
            limit: 0,
            access: AccessRights::new(),
            field,
        }
    }

    #[inline]
    #[must_use]
    pub const fn selector(&self) -> SegmentSelector {
        self.selector
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    #[inline]
    #[must_use]
    pub const fn access(&self) -> AccessRights {
        self.access
    }

    #[inline]
    #[must_use]
    pub const fn field(&self) -> GuestSegmentField {
        self.field
    }
}
