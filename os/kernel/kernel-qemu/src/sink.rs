use core::fmt;

/// Destination for formatted debug output, one byte at a time.
pub trait ByteSink {
    fn write_byte(&self, byte: u8);

    #[inline]
    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }
}

/// QEMU's `-debugcon` I/O port.
#[derive(Debug, Default, Copy, Clone)]
pub struct DebugconPort;

impl DebugconPort {
    pub const PORT: u16 = 0x402;
}

impl ByteSink for DebugconPort {
    #[inline]
    fn write_byte(&self, byte: u8) {
        #[cfg(all(feature = "enabled", target_arch = "x86_64"))]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") Self::PORT,
                in("al") byte,
                options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(all(feature = "enabled", target_arch = "x86_64")))]
        let _ = byte;
    }
}

/// `fmt::Write` adapter over a [`ByteSink`].
pub struct SinkWriter<'a, S: ?Sized> {
    sink: &'a S,
}

impl<'a, S: ByteSink + ?Sized> SinkWriter<'a, S> {
    #[inline]
    #[must_use]
    pub const fn new(sink: &'a S) -> Self {
        Self { sink }
    }
}

impl<S: ByteSink + ?Sized> fmt::Write for SinkWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::fmt::Write;

    #[derive(Default)]
    struct Capture(RefCell<Vec<u8>>);

    impl ByteSink for Capture {
        fn write_byte(&self, byte: u8) {
            self.0.borrow_mut().push(byte);
        }
    }

    #[test]
    fn writer_forwards_utf8_bytes() {
        let sink = Capture::default();
        write!(SinkWriter::new(&sink), "pfn={:#x} µ", 0x200).unwrap();
        assert_eq!(sink.0.into_inner(), "pfn=0x200 µ".as_bytes());
    }
}
