//! # VMX Guest Bootstrapping
//!
//! Derives the initial register state of a VMX guest from the host's own
//! segmentation and loads a code image for it to run.
//!
//! ```text
//! HostSelectors ──┐
//!                 ├─► SegmentDescriptor::from_host ─► GuestRegisterState ─► vmcs_writes()
//! HostGdt ────────┘                                         ▲
//! GuestMemory ── image copy, virt_to_phys(base) = RIP ──────┘
//! ```
//!
//! Everything except reading the live host registers and issuing `vmwrite`
//! is plain data and runs in host tests.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod bootstrap;
pub mod descriptor;
pub mod guest_state;
pub mod host;
pub mod segment;
pub mod selectors;

pub use bootstrap::{GuestMemory, GuestSetupError, TEST_GUEST_CODE, bootstrap_guest, bootstrap_test_guest};
pub use descriptor::GdtDescriptor;
pub use guest_state::{DescriptorTableRegister, GUEST_STATE_WRITES, GuestRegisterState, VmWriteError, VmcsField, VmcsWrite};
pub use host::{HostGdt, HostSelectors};
pub use segment::{AccessRights, GuestSegmentField, SegmentDescriptor};
pub use selectors::{SegmentSelector, Table};
