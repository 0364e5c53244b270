//! # Direct-map `PhysMapper`
//!
//! Every physical address is reachable at `phys_to_virt(pa)` inside the
//! direct physical-mapping window, so page-table frames can be edited without
//! creating temporary mappings.

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::{PhysMapper, phys_to_virt};

/// [`PhysMapper`] through the kernel's direct physical-mapping window.
#[derive(Debug, Default, Copy, Clone)]
pub struct DirectMapPhysMapper;

impl PhysMapper for DirectMapPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = phys_to_virt(pa).as_mut_ptr::<T>();
        // SAFETY: the direct map covers all of physical memory; the caller
        // guarantees `T` and exclusivity.
        unsafe { &mut *ptr }
    }
}
