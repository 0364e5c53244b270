//! # Physical Memory Layout

/// First byte above legacy low memory (1 MiB).
///
/// Usable RAM that ends at or below this boundary is catalogued as low memory
/// and never handed to the frame allocator.
pub const LOW_MEMORY_END: u64 = 0x0010_0000;

/// Top of the initial guest stack handed to the test guest.
pub const GUEST_STACK_TOP: u64 = 0x0040_0000; // 4 MiB

const _: () = {
    assert!(LOW_MEMORY_END.is_multiple_of(4096));
    assert!(GUEST_STACK_TOP.is_multiple_of(16));
};
