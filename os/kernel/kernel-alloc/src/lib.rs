//! # Kernel Physical Memory Management
//!
//! ```text
//! boot memory map ──► ZoneCatalog ──► memory_init ──► FrameAllocator
//!                                                         │ PageFrames
//!                                                         ▼
//!                      KernelPageTables::pmd() ──► map_frames / Vmm
//! ```
//!
//! * [`zones`]: decodes the multiboot2 memory map into typed zones.
//! * [`frame_alloc`]: the 4 KiB frame pool, allocated and released as
//!   owned [`PageFrames`](frame_alloc::PageFrames) runs.
//! * [`phys_mapper`]: reaches page-table frames through the direct map.
//! * [`vmm`]: installs 2 MiB kernel mappings.
//!
//! All of it is single-threaded boot code: the allocator is an owned value
//! passed by `&mut`, there are no globals.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
mod frame_map;
pub mod phys_mapper;
pub mod vmm;
pub mod zones;

pub use crate::frame_alloc::{
    AllocError, FrameAllocator, InitError, PageFrames, memory_init, memory_init_in, metadata_words,
};
pub use crate::frame_map::FrameRun;
pub use crate::zones::{MAX_ZONES, MemZone, ZoneCatalog, ZoneType};
