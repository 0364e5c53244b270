//! # Initial guest register state
//!
//! [`GuestRegisterState`] is the register file a guest starts with on its
//! first VM entry. It is plain data until [`GuestRegisterState::vmcs_writes`]
//! turns it into the list of guest-state VMCS fields and values.

use crate::segment::{GuestSegmentField, SegmentDescriptor};
use core::fmt;
use kernel_registers::{Cr0, Cr3, Rflags};
use utils_accessors_derive::Setters;

/// A VMCS field encoding (Intel SDM Vol. 3, Appendix B).
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VmcsField(pub(crate) u32);

impl VmcsField {
    pub const GUEST_CR0: Self = Self(0x6800);
    pub const GUEST_CR3: Self = Self(0x6802);
    pub const GUEST_CR4: Self = Self(0x6804);
    pub const GUEST_GDTR_LIMIT: Self = Self(0x4810);
    pub const GUEST_IDTR_LIMIT: Self = Self(0x4812);
    pub const GUEST_GDTR_BASE: Self = Self(0x6816);
    pub const GUEST_IDTR_BASE: Self = Self(0x6818);
    pub const GUEST_RSP: Self = Self(0x681C);
    pub const GUEST_RIP: Self = Self(0x681E);
    pub const GUEST_RFLAGS: Self = Self(0x6820);

    #[inline]
    #[must_use]
    pub const fn encoding(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for VmcsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VmcsField({:#06X})", self.0)
    }
}

/// One `vmwrite`: a field and the value to store in it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VmcsWrite {
    pub field: VmcsField,
    pub value: u64,
}

impl VmcsWrite {
    const fn new(field: VmcsField, value: u64) -> Self {
        Self { field, value }
    }
}

/// Number of fields [`GuestRegisterState::vmcs_writes`] produces.
pub const GUEST_STATE_WRITES: usize = 10 + 4 * 8;

/// GDTR or IDTR.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorTableRegister {
    pub base: u64,
    pub limit: u16,
}

impl DescriptorTableRegister {
    #[must_use]
    pub const fn zero() -> Self {
        Self { base: 0, limit: 0 }
    }
}

/// Why a `vmwrite` failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmWriteError {
    /// No current VMCS (`VMfailInvalid`).
    #[error("vmwrite to {field:?} failed: no current VMCS")]
    NoCurrentVmcs { field: VmcsField },
    /// The field is unsupported or read-only (`VMfailValid`).
    #[error("vmwrite to {field:?} rejected by the current VMCS")]
    Rejected { field: VmcsField },
}

/// Guest register state loaded on the first VM entry.
#[derive(Copy, Clone, Debug, Setters)]
pub struct GuestRegisterState {
    pub cr0: Cr0,
    pub cr3: Cr3,
    pub cr4: u64,
    pub rflags: Rflags,
    pub rsp: u64,
    pub rip: u64,
    pub gdtr: DescriptorTableRegister,
    pub idtr: DescriptorTableRegister,
    pub cs: SegmentDescriptor,
    pub ds: SegmentDescriptor,
    pub ss: SegmentDescriptor,
    pub es: SegmentDescriptor,
    pub fs: SegmentDescriptor,
    pub gs: SegmentDescriptor,
    pub tr: SegmentDescriptor,
    pub ldtr: SegmentDescriptor,
}

impl GuestRegisterState {
    /// All registers zero (RFLAGS `0x2`), every segment deferred.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cr0: Cr0::new(),
            cr3: Cr3::new(),
            cr4: 0,
            rflags: Rflags::new(),
            rsp: 0,
            rip: 0,
            gdtr: DescriptorTableRegister::zero(),
            idtr: DescriptorTableRegister::zero(),
            cs: SegmentDescriptor::deferred(GuestSegmentField::Cs),
            ds: SegmentDescriptor::deferred(GuestSegmentField::Ds),
            ss: SegmentDescriptor::deferred(GuestSegmentField::Ss),
            es: SegmentDescriptor::deferred(GuestSegmentField::Es),
            fs: SegmentDescriptor::deferred(GuestSegmentField::Fs),
            gs: SegmentDescriptor::deferred(GuestSegmentField::Gs),
            tr: SegmentDescriptor::deferred(GuestSegmentField::Tr),
            ldtr: SegmentDescriptor::deferred(GuestSegmentField::Ldtr),
        }
    }

    /// Segments in VMCS encoding order.
    #[must_use]
    pub const fn segments(&self) -> [&SegmentDescriptor; 8] {
        [
            &self.es, &self.cs, &self.ss, &self.ds, &self.fs, &self.gs, &self.ldtr, &self.tr,
        ]
    }

    /// The guest-state fields in the order they are written: control
    /// registers, RFLAGS/RSP/RIP, GDTR/IDTR, then selector, limit, access
    /// rights and base of each segment.
    ///
    /// Each segment is written through the field group it is tagged with.
    #[must_use]
    pub fn vmcs_writes(&self) -> [VmcsWrite; GUEST_STATE_WRITES] {
        let mut out = [VmcsWrite::new(VmcsField(0), 0); GUEST_STATE_WRITES];
        out[..10].copy_from_slice(&[
            VmcsWrite::new(VmcsField::GUEST_CR0, self.cr0.into_bits()),
            VmcsWrite::new(VmcsField::GUEST_CR3, self.cr3.into_bits()),
            VmcsWrite::new(VmcsField::GUEST_CR4, self.cr4),
            VmcsWrite::new(VmcsField::GUEST_RFLAGS, self.rflags.into_bits()),
            VmcsWrite::new(VmcsField::GUEST_RSP, self.rsp),
            VmcsWrite::new(VmcsField::GUEST_RIP, self.rip),
            VmcsWrite::new(VmcsField::GUEST_GDTR_BASE, self.gdtr.base),
            VmcsWrite::new(VmcsField::GUEST_GDTR_LIMIT, u64::from(self.gdtr.limit)),
            VmcsWrite::new(VmcsField::GUEST_IDTR_BASE, self.idtr.base),
            VmcsWrite::new(VmcsField::GUEST_IDTR_LIMIT, u64::from(self.idtr.limit)),
        ]);

        for (chunk, seg) in out[10..].chunks_exact_mut(4).zip(self.segments()) {
            let field = seg.field();
            chunk.copy_from_slice(&[
                VmcsWrite::new(field.selector(), u64::from(seg.selector().into_bits())),
                VmcsWrite::new(field.limit(), u64::from(seg.limit())),
                VmcsWrite::new(field.access_rights(), u64::from(seg.access().into_bits())),
                VmcsWrite::new(field.base(), seg.base()),
            ]);
        }
        out
    }

    /// Store the state into the current VMCS.
    ///
    /// # Safety
    /// Must run in VMX root operation with the guest's VMCS made current
    /// via `vmptrld`.
    ///
    /// # Errors
    /// The first `vmwrite` that fails stops the sequence.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    pub unsafe fn write_to_current_vmcs(&self) -> Result<(), VmWriteError> {
        for w in self.vmcs_writes() {
            log::trace!("vmwrite {:?} <- {:#x}", w.field, w.value);
            unsafe { vmwrite(w.field, w.value)? };
        }
        Ok(())
    }
}

impl Default for GuestRegisterState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
unsafe fn vmwrite(field: VmcsField, value: u64) -> Result<(), VmWriteError> {
    let invalid: u8;
    let rejected: u8;
    unsafe {
        core::arch::asm!(
            "vmwrite {f}, {v}",
            "setc {cf}",
            "setz {zf}",
            f = in(reg) u64::from(field.0),
            v = in(reg) value,
            cf = out(reg_byte) invalid,
            zf = out(reg_byte) rejected,
            options(nostack)
        );
    }
    if invalid != 0 {
        Err(VmWriteError::NoCurrentVmcs { field })
    } else if rejected != 0 {
        Err(VmWriteError::Rejected { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::GdtDescriptor;
    use crate::selectors::SegmentSelector;

    fn find(writes: &[VmcsWrite], field: VmcsField) -> u64 {
        writes.iter().find(|w| w.field == field).unwrap().value
    }

    #[test]
    fn fresh_state() {
        let s = GuestRegisterState::new();
        assert_eq!(s.rflags.into_bits(), 0x2);
        assert_eq!(s.tr.field(), GuestSegmentField::Tr);
        assert_eq!(s.gdtr, DescriptorTableRegister::zero());
    }

    #[test]
    fn setters_chain() {
        let mut s = GuestRegisterState::new().with_rsp(0x40_0000).with_cr4(0x2000);
        s.set_rip(0x1000).set_rflags(Rflags::new().with_if_interrupt_enable(true));
        assert_eq!(s.rsp, 0x40_0000);
        assert_eq!(s.cr4, 0x2000);
        assert_eq!(s.rip, 0x1000);
        assert_eq!(s.rflags.into_bits(), 0x202);
    }

    #[test]
    fn writes_cover_every_field_once() {
        let writes = GuestRegisterState::new().vmcs_writes();
        assert_eq!(writes.len(), 42);
        for (i, a) in writes.iter().enumerate() {
            assert!(writes[i + 1..].iter().all(|b| b.field != a.field), "{:?} twice", a.field);
        }
        assert_eq!(writes[0].field, VmcsField::GUEST_CR0);
        assert_eq!(writes[10].field.encoding(), 0x0800);
        assert_eq!(writes[41].field.encoding(), 0x6814);
    }

    #[test]
    fn writes_carry_values() {
        let cs = SegmentDescriptor::from_host(
            GdtDescriptor::kernel_code(),
            SegmentSelector::gdt(1),
            GuestSegmentField::Cs,
        );
        let state = GuestRegisterState::new()
            .with_cr0(Cr0::protected_mode())
            .with_rip(0x0020_0000)
            .with_rsp(0x0040_0000)
            .with_gdtr(DescriptorTableRegister { base: 0x5000, limit: 0x17 })
            .with_cs(cs);
        let w = state.vmcs_writes();

        assert_eq!(find(&w, VmcsField::GUEST_CR0), 1);
        assert_eq!(find(&w, VmcsField::GUEST_RIP), 0x0020_0000);
        assert_eq!(find(&w, VmcsField::GUEST_RSP), 0x0040_0000);
        assert_eq!(find(&w, VmcsField::GUEST_RFLAGS), 0x2);
        assert_eq!(find(&w, VmcsField::GUEST_GDTR_BASE), 0x5000);
        assert_eq!(find(&w, VmcsField::GUEST_GDTR_LIMIT), 0x17);
        assert_eq!(find(&w, GuestSegmentField::Cs.selector()), 0x08);
        assert_eq!(find(&w, GuestSegmentField::Cs.access_rights()), 0x1_009A);
    }
}
