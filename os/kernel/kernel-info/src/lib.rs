//! # Kernel Configuration and Boot Interface
//!
//! Fixed layout constants and the boot hand-off structure shared between the
//! multiboot2 entry glue and the kernel core.
//!
//! * [`boot`]: the decoded memory-map buffer ([`BootMemoryMap`](boot::BootMemoryMap)).
//! * [`memory`]: the physical layout (low-memory boundary, kernel load address).
//!
//! The virtual layout (kernel offset and direct-map window) lives in the
//! address translator of `kernel-vmem`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
