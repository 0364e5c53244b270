use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Page granularity marker. Only [`Size4K`] and [`Size2M`] exist.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes.
    const SIZE: u64;
    /// `log2(SIZE)`: the number of offset bits below a page boundary.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            #[inline]
            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }
    };
}

page_size!(
    /// 4 KiB base frame, the unit the frame allocator hands out.
    Size4K, 12, "4K"
);

page_size!(
    /// 2 MiB large page, the only leaf size installed into kernel page tables.
    Size2M, 21, "2M"
);

/// Number of 4 KiB frames covered by one 2 MiB large page.
pub const FRAMES_PER_LARGE_PAGE: u64 = Size2M::SIZE / Size4K::SIZE;

const _: () = assert!(FRAMES_PER_LARGE_PAGE == 512);
const _: () = assert!(Size2M::SIZE == 2 * 1024 * 1024);
