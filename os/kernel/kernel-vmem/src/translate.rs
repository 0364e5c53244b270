//! # Address Translator
//!
//! The only place that knows how the kernel's virtual views map onto physical
//! memory. Two views exist:
//!
//! ```text
//! 0xffff_8800_0000_0000 ┌──────────────────────────────┐ PHYS_MAP_START
//!                       │ direct physical map (64 TiB) │ always mapped
//! 0xffff_c800_0000_0000 ├──────────────────────────────┤ PHYS_MAP_END
//!                       ┆                              ┆
//! 0xffff_ffff_8000_0000 ├──────────────────────────────┤ KERNEL_OFFSET
//!                       │ kernel image (canonical)     │ mapped on demand
//! 0xffff_ffff_ffff_ffff └──────────────────────────────┘
//! ```
//!
//! Nothing outside this module adds or subtracts these offsets.

use core::ops::Range;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Canonical kernel mapping: `va = pa + KERNEL_OFFSET`.
const KERNEL_OFFSET: u64 = 0xffff_ffff_8000_0000;

/// Start of the direct physical-mapping window.
const PHYS_MAP_START: u64 = 0xffff_8800_0000_0000;

/// End (exclusive) of the direct physical-mapping window.
const PHYS_MAP_END: u64 = 0xffff_c800_0000_0000;

const _: () = {
    assert!(PHYS_MAP_START < PHYS_MAP_END);
    assert!(PHYS_MAP_END <= KERNEL_OFFSET);
    assert!(PHYS_MAP_START.is_multiple_of(1 << 39));
    assert!(KERNEL_OFFSET.is_multiple_of(1 << 21));
};

/// Translate a kernel virtual address to its physical address.
///
/// Addresses at or above the kernel offset are resolved first, then the
/// direct-map window. Anything else has no fixed translation and yields
/// `None`; callers must handle it.
#[inline]
#[must_use]
pub const fn virt_to_phys(v: VirtualAddress) -> Option<PhysicalAddress> {
    let v = v.as_u64();
    if v >= KERNEL_OFFSET {
        Some(PhysicalAddress::new(v - KERNEL_OFFSET))
    } else if PHYS_MAP_START <= v && v < PHYS_MAP_END {
        Some(PhysicalAddress::new(v - PHYS_MAP_START))
    } else {
        None
    }
}

/// Direct-map address of `p`. Always mapped, but not in the canonical
/// kernel range.
#[inline]
#[must_use]
pub const fn phys_to_virt(p: PhysicalAddress) -> VirtualAddress {
    debug_assert!(p.as_u64() < PHYS_MAP_END - PHYS_MAP_START);
    VirtualAddress::new(PHYS_MAP_START.wrapping_add(p.as_u64()))
}

/// Canonical kernel address of `p`. Not guaranteed to be mapped.
#[inline]
#[must_use]
pub const fn va(p: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(KERNEL_OFFSET.wrapping_add(p.as_u64()))
}

/// First address of the canonical kernel region.
#[inline]
#[must_use]
pub const fn kernel_offset() -> VirtualAddress {
    VirtualAddress::new(KERNEL_OFFSET)
}

/// The direct physical-mapping window.
#[inline]
#[must_use]
pub const fn direct_map_range() -> Range<VirtualAddress> {
    VirtualAddress::new(PHYS_MAP_START)..VirtualAddress::new(PHYS_MAP_END)
}
