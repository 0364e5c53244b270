//! # Test guest bootstrap
//!
//! Builds the state of a minimal protected-mode guest: flat segments copied
//! from the host, paging off, and a small image at the start of guest memory
//! that prints a greeting on COM1 and halts.

use crate::guest_state::{DescriptorTableRegister, GuestRegisterState};
use crate::host::{HostGdt, HostSelectors};
use crate::segment::{GuestSegmentField, SegmentDescriptor};
use crate::selectors::SegmentSelector;
use kernel_info::memory::GUEST_STACK_TOP;
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::{Cr0, Rflags};
use kernel_vmem::virt_to_phys;
use log::{debug, info};

/// Writes `"hello from guest !\r\n"` to port `0x3F8` one byte at a time,
/// then halts.
pub const TEST_GUEST_CODE: [u8; 117] = [
    0x56, 0xBA, 0xF8, 0x03, 0x00, 0x00, 0x53, 0xB8, 0x68, 0x00, 0x00, 0x00,
    0xEE, 0xBB, 0x65, 0x00, 0x00, 0x00, 0x89, 0xD8, 0xEE, 0xB8, 0x6C, 0x00,
    0x00, 0x00, 0xEE, 0xEE, 0xBE, 0x6F, 0x00, 0x00, 0x00, 0x89, 0xF0, 0xEE,
    0xB9, 0x20, 0x00, 0x00, 0x00, 0x89, 0xC8, 0xEE, 0xB8, 0x66, 0x00, 0x00,
    0x00, 0xEE, 0xB8, 0x72, 0x00, 0x00, 0x00, 0xEE, 0x89, 0xF0, 0xEE, 0xB8,
    0x6D, 0x00, 0x00, 0x00, 0xEE, 0x89, 0xC8, 0xEE, 0xB8, 0x67, 0x00, 0x00,
    0x00, 0xEE, 0xB8, 0x75, 0x00, 0x00, 0x00, 0xEE, 0x89, 0xD8, 0xEE, 0xB8,
    0x73, 0x00, 0x00, 0x00, 0xEE, 0xB8, 0x74, 0x00, 0x00, 0x00, 0xEE, 0x89,
    0xC8, 0xEE, 0xB8, 0x21, 0x00, 0x00, 0x00, 0xEE, 0xB8, 0x0D, 0x00, 0x00,
    0x00, 0xEE, 0xB8, 0x0A, 0x00, 0x00, 0x00, 0xEE, 0xF4,
];

/// Memory handed to the guest: a host-writable view plus the virtual address
/// whose translation becomes guest-physical address of its first byte.
pub struct GuestMemory<'a> {
    base: VirtualAddress,
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    /// `bytes` is the memory the kernel reaches at `base`.
    #[must_use]
    pub const fn new(base: VirtualAddress, bytes: &'a mut [u8]) -> Self {
        Self { base, bytes }
    }

    /// `len` bytes of memory at kernel virtual address `base`.
    ///
    /// # Safety
    /// `[base, base + len)` must be mapped, writable and exclusively owned by
    /// the returned value for `'a`.
    #[must_use]
    pub unsafe fn from_virt(base: VirtualAddress, len: usize) -> Self {
        let ptr = base.as_mut_ptr::<u8>();
        Self::new(base, unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// Why the guest could not be set up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuestSetupError {
    #[error("host {segment} selector {selector:#06x} is outside the host GDT")]
    SelectorOutOfRange {
        segment: GuestSegmentField,
        selector: u16,
    },
    #[error("guest image of {image} bytes does not fit into {memory} bytes of guest memory")]
    ImageTooLarge { image: usize, memory: usize },
    #[error("guest memory at {0} has no physical address")]
    UntranslatableGuestMemory(VirtualAddress),
}

/// Set up the built-in [`TEST_GUEST_CODE`] guest.
///
/// # Errors
/// See [`bootstrap_guest`].
pub fn bootstrap_test_guest(
    host: &HostSelectors,
    gdt: &HostGdt<'_>,
    memory: &mut GuestMemory<'_>,
) -> Result<GuestRegisterState, GuestSetupError> {
    bootstrap_guest(host, gdt, memory, &TEST_GUEST_CODE)
}

/// Copy `image` to the start of `memory` and return the register state that
/// enters it in protected mode without paging.
///
/// CS, DS, SS and ES are converted from the host descriptors their selectors
/// name. FS, GS, TR and LDTR are left deferred. Guest memory is untouched on
/// error.
///
/// # Errors
/// - [`GuestSetupError::SelectorOutOfRange`] if a host selector has no GDT entry.
/// - [`GuestSetupError::ImageTooLarge`] if `image` is longer than `memory`.
/// - [`GuestSetupError::UntranslatableGuestMemory`] if the base of `memory`
///   has no physical address.
pub fn bootstrap_guest(
    host: &HostSelectors,
    gdt: &HostGdt<'_>,
    memory: &mut GuestMemory<'_>,
    image: &[u8],
) -> Result<GuestRegisterState, GuestSetupError> {
    let cs = guest_segment(gdt, host.cs, GuestSegmentField::Cs)?;
    let ds = guest_segment(gdt, host.ds, GuestSegmentField::Ds)?;
    let ss = guest_segment(gdt, host.ss, GuestSegmentField::Ss)?;
    let es = guest_segment(gdt, host.es, GuestSegmentField::Es)?;

    if image.len() > memory.len() {
        return Err(GuestSetupError::ImageTooLarge {
            image: image.len(),
            memory: memory.len(),
        });
    }
    let entry = virt_to_phys(memory.base())
        .ok_or(GuestSetupError::UntranslatableGuestMemory(memory.base()))?;

    memory.bytes[..image.len()].copy_from_slice(image);

    let state = GuestRegisterState::new()
        .with_cr0(Cr0::protected_mode())
        .with_cs(cs)
        .with_ds(ds)
        .with_ss(ss)
        .with_es(es)
        .with_gdtr(DescriptorTableRegister::zero())
        .with_idtr(DescriptorTableRegister::zero())
        .with_rflags(Rflags::new())
        .with_rsp(GUEST_STACK_TOP)
        .with_rip(entry.as_u64());

    info!(
        "guest image: {} bytes at {}, entry {entry}",
        image.len(),
        memory.base()
    );
    Ok(state)
}

fn guest_segment(
    gdt: &HostGdt<'_>,
    selector: SegmentSelector,
    field: GuestSegmentField,
) -> Result<SegmentDescriptor, GuestSetupError> {
    let desc = gdt
        .descriptor(selector)
        .ok_or(GuestSetupError::SelectorOutOfRange {
            segment: field,
            selector: selector.into_bits(),
        })?;
    let seg = SegmentDescriptor::from_host(desc, selector, field);
    debug!(
        "guest {field}: selector={:#06x} base={:#x} limit={:#x} ar={:#x}",
        selector.into_bits(),
        seg.base(),
        seg.limit(),
        seg.access().into_bits()
    );
    Ok(seg)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the handful of instructions the test image uses and collect
    /// what it writes to the port in DX.
    fn run_test_image() -> (u16, Vec<u8>) {
        let code = &TEST_GUEST_CODE;
        let mut regs = [0u32; 8];
        let mut out = Vec::new();
        let mut port = None;
        let mut ip = 0;
        loop {
            match code[ip] {
                0x50..=0x57 => ip += 1,
                op @ 0xB8..=0xBF => {
                    let imm = u32::from_le_bytes(code[ip + 1..ip + 5].try_into().unwrap());
                    regs[usize::from(op - 0xB8)] = imm;
                    ip += 5;
                }
                0x89 => {
                    let modrm = code[ip + 1];
                    assert_eq!(modrm >> 6, 0b11);
                    regs[usize::from(modrm & 7)] = regs[usize::from((modrm >> 3) & 7)];
                    ip += 2;
                }
                0xEE => {
                    let dx = u16::try_from(regs[2]).unwrap();
                    assert!(port.is_none_or(|p| p == dx));
                    port = Some(dx);
                    out.push(regs[0].to_le_bytes()[0]);
                    ip += 1;
                }
                0xF4 => return (port.unwrap(), out),
                op => panic!("unexpected opcode {op:#04x} at {ip}"),
            }
        }
    }

    #[test]
    fn test_image_greets_on_com1() {
        let (port, text) = run_test_image();
        assert_eq!(port, 0x3F8);
        assert_eq!(text, b"hello from guest !\r\n");
    }

    #[test]
    fn guest_memory_reports_size() {
        let mut buf = [0u8; 16];
        let mem = GuestMemory::new(VirtualAddress::new(0x1000), &mut buf);
        assert_eq!(mem.len(), 16);
        assert!(!mem.is_empty());
        assert_eq!(mem.base().as_u64(), 0x1000);
    }
}
