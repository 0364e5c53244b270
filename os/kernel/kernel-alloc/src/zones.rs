//! # Zone Catalog
//!
//! Decodes the multiboot2 memory-map entries handed over by the boot glue
//! into typed [`MemZone`]s. Each entry is
//!
//! ```text
//! offset  0: u64 base_addr
//! offset  8: u64 length
//! offset 16: u32 type
//! offset 20: u32 reserved
//! ```
//!
//! and entries are `entry_size` bytes apart. Overlaps are not checked here;
//! [`memory_init`](crate::frame_alloc::memory_init) rejects overlapping
//! usable zones.

use crate::frame_alloc::InitError;
use core::fmt;
use kernel_info::boot::BootMemoryMap;
use kernel_info::memory::LOW_MEMORY_END;
use log::{info, warn};

/// Maximum number of memory-map entries the catalog holds.
pub const MAX_ZONES: usize = 64;

/// Smallest stride that still covers `base_addr`, `length` and `type`.
const MIN_ENTRY_SIZE: usize = 20;

/// Multiboot2 memory types.
const MULTIBOOT_MEMORY_AVAILABLE: u32 = 1;
const MULTIBOOT_MEMORY_RESERVED: u32 = 2;
const MULTIBOOT_MEMORY_ACPI_RECLAIMABLE: u32 = 3;
const MULTIBOOT_MEMORY_NVS: u32 = 4;
const MULTIBOOT_MEMORY_BADRAM: u32 = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZoneType {
    /// RAM above the low-memory boundary; feeds the frame allocator.
    Usable,
    /// RAM that ends at or below 1 MiB.
    LowMem,
    Reserved,
    /// Any other firmware type code (ACPI, NVS, bad RAM, ...).
    Other(u32),
}

impl ZoneType {
    /// The multiboot2 type code this zone was decoded from.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Usable | Self::LowMem => MULTIBOOT_MEMORY_AVAILABLE,
            Self::Reserved => MULTIBOOT_MEMORY_RESERVED,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            MULTIBOOT_MEMORY_AVAILABLE => f.write_str("AVAILABLE"),
            MULTIBOOT_MEMORY_RESERVED => f.write_str("RESERVED"),
            MULTIBOOT_MEMORY_ACPI_RECLAIMABLE => f.write_str("ACPI_RECLAIMABLE"),
            MULTIBOOT_MEMORY_NVS => f.write_str("NVS"),
            MULTIBOOT_MEMORY_BADRAM => f.write_str("BADRAM"),
            code => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// One contiguous physical range as reported by the firmware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemZone {
    pub start: u64,
    pub length: u64,
    pub ty: ZoneType,
}

impl MemZone {
    const EMPTY: Self = Self {
        start: 0,
        length: 0,
        ty: ZoneType::Reserved,
    };

    /// Classify a raw entry. Available RAM that lies entirely below 1 MiB
    /// becomes [`ZoneType::LowMem`].
    #[must_use]
    pub const fn from_raw(start: u64, length: u64, code: u32) -> Self {
        let ty = match code {
            MULTIBOOT_MEMORY_AVAILABLE => match start.checked_add(length) {
                Some(end) if end <= LOW_MEMORY_END => ZoneType::LowMem,
                _ => ZoneType::Usable,
            },
            MULTIBOOT_MEMORY_RESERVED => ZoneType::Reserved,
            other => ZoneType::Other(other),
        };
        Self { start, length, ty }
    }

    /// Exclusive end address, or `None` if `start + length` overflows.
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }
}

/// The decoded memory map, in firmware order.
#[derive(Clone)]
pub struct ZoneCatalog {
    zones: [MemZone; MAX_ZONES],
    len: usize,
}

impl ZoneCatalog {
    /// Decode `map`, a buffer of multiboot2 entries `entry_size` bytes apart.
    ///
    /// A trailing partial entry is ignored, and so is every entry past the
    /// first [`MAX_ZONES`].
    ///
    /// # Errors
    /// - [`InitError::NoMemoryMap`] if `map` is empty.
    /// - [`InitError::MalformedMap`] if `entry_size` is smaller than an entry.
    pub fn from_bytes(map: &[u8], entry_size: usize) -> Result<Self, InitError> {
        if map.is_empty() {
            return Err(InitError::NoMemoryMap);
        }
        if entry_size < MIN_ENTRY_SIZE {
            return Err(InitError::MalformedMap);
        }

        let entries = map.chunks_exact(entry_size);
        if !entries.remainder().is_empty() {
            warn!(
                "memory map: ignoring {} trailing bytes (entry size {entry_size})",
                entries.remainder().len()
            );
        }

        let mut catalog = Self::new();
        for entry in entries {
            catalog.push(MemZone::from_raw(read_u64(entry, 0), read_u64(entry, 8), read_u32(entry, 16)));
        }
        Ok(catalog)
    }

    /// Decode the memory map the boot glue handed over.
    ///
    /// # Safety
    /// `map.entries_ptr` must point to `map.entries_len` readable bytes that
    /// stay valid and unmodified while this call runs.
    ///
    /// # Errors
    /// As [`from_bytes`](Self::from_bytes).
    pub unsafe fn from_boot_info(map: &BootMemoryMap) -> Result<Self, InitError> {
        if map.is_empty() {
            return Err(InitError::NoMemoryMap);
        }
        let len = usize::try_from(map.entries_len).map_err(|_| InitError::MalformedMap)?;
        let entry_size = usize::try_from(map.entry_size).map_err(|_| InitError::MalformedMap)?;
        let addr = usize::try_from(map.entries_ptr).map_err(|_| InitError::MalformedMap)?;
        let ptr = core::ptr::with_exposed_provenance::<u8>(addr);
        let bytes = unsafe { core::slice::from_raw_parts(ptr, len) };
        Self::from_bytes(bytes, entry_size)
    }

    /// Build a catalog from already decoded zones. Zones past the first
    /// [`MAX_ZONES`] are dropped with a warning.
    #[must_use]
    pub fn from_zones(zones: &[MemZone]) -> Self {
        let mut catalog = Self::new();
        for zone in zones {
            catalog.push(*zone);
        }
        catalog
    }

    const fn new() -> Self {
        Self {
            zones: [MemZone::EMPTY; MAX_ZONES],
            len: 0,
        }
    }

    fn push(&mut self, zone: MemZone) {
        let Some(slot) = self.zones.get_mut(self.len) else {
            warn!(
                "memory map: dropping zone base_addr={:#x}, length={:#x}, type={} past {MAX_ZONES} entries",
                zone.start, zone.length, zone.ty
            );
            return;
        };
        *slot = zone;
        self.len += 1;
    }

    #[must_use]
    pub fn zones(&self) -> &[MemZone] {
        &self.zones[..self.len]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Log every zone at `info` level.
    pub fn log_zones(&self) {
        for zone in self.zones() {
            info!(
                "base_addr={:#x}, length={:#x}, type={}",
                zone.start, zone.length, zone.ty
            );
        }
    }
}

impl fmt::Debug for ZoneCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.zones()).finish()
    }
}

fn read_u64(entry: &[u8], at: usize) -> u64 {
    let mut b = [0; 8];
    b.copy_from_slice(&entry[at..at + 8]);
    u64::from_le_bytes(b)
}

fn read_u32(entry: &[u8], at: usize) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&entry[at..at + 4]);
    u32::from_le_bytes(b)
}
