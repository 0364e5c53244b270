//! # Host segmentation state
//!
//! The guest's initial segments are copies of the host's: the selectors the
//! host runs with and the GDT they index.

use crate::descriptor::GdtDescriptor;
use crate::selectors::{SegmentSelector, Table};
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use kernel_memory_addresses::VirtualAddress;

/// The selector values the host runs with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostSelectors {
    pub cs: SegmentSelector,
    pub ds: SegmentSelector,
    pub ss: SegmentSelector,
    pub es: SegmentSelector,
}

impl HostSelectors {
    /// Read CS, DS, SS and ES of the running CPU.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[must_use]
    pub fn current() -> Self {
        let (cs, ds, ss, es): (u16, u16, u16, u16);
        // SAFETY: moving a segment register into a GPR has no side effects.
        unsafe {
            core::arch::asm!(
                "mov {0:x}, cs",
                "mov {1:x}, ds",
                "mov {2:x}, ss",
                "mov {3:x}, es",
                out(reg) cs,
                out(reg) ds,
                out(reg) ss,
                out(reg) es,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self {
            cs: SegmentSelector::from_bits(cs),
            ds: SegmentSelector::from_bits(ds),
            ss: SegmentSelector::from_bits(ss),
            es: SegmentSelector::from_bits(es),
        }
    }
}

/// A read-only view of the host GDT.
#[derive(Copy, Clone, Debug)]
pub struct HostGdt<'a> {
    entries: &'a [GdtDescriptor],
}

impl<'a> HostGdt<'a> {
    #[must_use]
    pub const fn from_entries(entries: &'a [GdtDescriptor]) -> Self {
        Self { entries }
    }

    /// The GDT the CPU currently uses, as reported by `sgdt`.
    ///
    /// # Safety
    /// The GDTR base must be a mapped virtual address and the table must
    /// not change while the view is alive.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[must_use]
    pub unsafe fn current() -> Self {
        #[repr(C, packed)]
        struct Gdtr {
            limit: u16,
            base: u64,
        }

        let mut gdtr = Gdtr { limit: 0, base: 0 };
        unsafe {
            core::arch::asm!(
                "sgdt [{}]",
                in(reg) &raw mut gdtr,
                options(nostack, preserves_flags)
            );
        }
        let (base, limit) = (gdtr.base, gdtr.limit);
        let len = (usize::from(limit) + 1) / size_of::<GdtDescriptor>();
        let ptr = VirtualAddress::new(base).as_mut_ptr::<GdtDescriptor>().cast_const();
        log::debug!("host GDT at {base:#x}, {len} entries");

        // SAFETY: the caller guarantees the GDTR describes live, mapped memory.
        Self::from_entries(unsafe { core::slice::from_raw_parts(ptr, len) })
    }

    #[must_use]
    pub const fn entries(&self) -> &'a [GdtDescriptor] {
        self.entries
    }

    /// The descriptor `selector` names, if it is a GDT selector inside the
    /// table.
    #[must_use]
    pub fn descriptor(&self, selector: SegmentSelector) -> Option<GdtDescriptor> {
        if selector.ti() != Table::Gdt {
            return None;
        }
        self.entries.get(selector.slot()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_selector() {
        let table = [
            GdtDescriptor::new(),
            GdtDescriptor::kernel_code(),
            GdtDescriptor::kernel_data(),
        ];
        let gdt = HostGdt::from_entries(&table);

        assert_eq!(gdt.descriptor(SegmentSelector::gdt(1)), Some(GdtDescriptor::kernel_code()));
        assert_eq!(gdt.descriptor(SegmentSelector::from_bits(0x10)), Some(GdtDescriptor::kernel_data()));
        assert_eq!(gdt.descriptor(SegmentSelector::gdt(3)), None);
        assert_eq!(gdt.descriptor(SegmentSelector::from_bits(0x0C)), None);
    }
}
