//! # Boot Memory Map Hand-off

use kernel_memory_addresses::PhysicalAddress;

/// Decoded multiboot2 memory-map tag as passed from the boot glue.
///
/// The boot code validates the multiboot2 magic and locates the memory-map
/// tag; the kernel core only sees the raw entry buffer and its stride.
/// Keep this `#[repr(C)]`; it is filled from assembly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMemoryMap {
    /// Virtual address of the first memory-map entry.
    pub entries_ptr: u64,

    /// Length of the entry buffer in **bytes**.
    pub entries_len: u64,

    /// Stride between entries (`entry_size` field of the tag).
    pub entry_size: u64,

    /// Physical address of the first byte past the loaded kernel image.
    pub kernel_end: u64,
}

impl BootMemoryMap {
    /// `true` if the boot loader did not supply a memory map.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries_ptr == 0 || self.entries_len == 0
    }

    /// The first physical address the frame allocator may hand out.
    #[must_use]
    pub const fn kernel_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.kernel_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_is_detected() {
        let map = BootMemoryMap {
            entries_ptr: 0,
            entries_len: 48,
            entry_size: 24,
            kernel_end: 0x0020_0000,
        };
        assert!(map.is_empty());
        assert_eq!(map.kernel_end().as_u64(), 0x0020_0000);
    }

    #[test]
    fn abi_size_is_stable() {
        assert_eq!(core::mem::size_of::<BootMemoryMap>(), 32);
    }
}
