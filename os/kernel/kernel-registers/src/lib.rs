//! # Typed `x86_64` Control Registers
//!
//! Bitfield models of the registers the hypervisor core reads or seeds into
//! guest state: CR0, CR3 and RFLAGS. Reading and writing the live registers
//! requires the `asm` feature and an `x86_64` target; the types themselves are
//! plain values and usable anywhere (including host tests).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;
#[cfg(feature = "cr3")]
pub mod cr3;
#[cfg(feature = "rflags")]
pub mod rflags;

#[cfg(feature = "cr0")]
pub use cr0::Cr0;
#[cfg(feature = "cr3")]
pub use cr3::Cr3;
#[cfg(feature = "rflags")]
pub use rflags::Rflags;

/// Read a privileged register.
pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Requires ring 0. Reading a control register from user mode faults.
    unsafe fn load_unsafe() -> Self;
}

/// Write a privileged register.
pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Requires ring 0, and the new value must keep the current execution
    /// environment valid (e.g. a CR3 whose tables still map the running code).
    unsafe fn store_unsafe(self);
}

/// Read a register that is accessible from any privilege level.
pub trait LoadRegister {
    fn load() -> Self;
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
