//! Encoding of `ioctl` request numbers.
//!
//! Most architectures use the generic layout from `asm-generic/ioctl.h`:
//!
//! | bits  | meaning                                      |
//! |-------|----------------------------------------------|
//! | 31-30 | direction: none, write, read or read/write   |
//! | 29-16 | size of the argument in bytes                |
//! | 15-8  | device class, an ASCII character (`'d'` for DRM) |
//! | 7-0   | function number                              |
//!
//! For example `0x82187201` is a read with an argument of `0x218` bytes,
//! device class `'r'` and function number 1.

use core::fmt;
use core::ops::BitOr;

const NR_BITS: u32 = 8;
const CLASS_BITS: u32 = 8;
const SIZE_BITS: u32 = 14;
const DIR_BITS: u32 = 2;

const NR_SHIFT: u32 = 0;
const CLASS_SHIFT: u32 = NR_SHIFT + NR_BITS;
const SIZE_SHIFT: u32 = CLASS_SHIFT + CLASS_BITS;
const DIR_SHIFT: u32 = SIZE_SHIFT + SIZE_BITS;

/// Largest argument size that fits in the size field.
pub const MAX_SIZE: usize = (1 << SIZE_BITS) - 1;

/// Data transfer direction of an ioctl, seen from user space.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Direction(u8);

impl Direction {
    pub const NONE: Self = Self(0);
    /// User space writes the argument, the kernel reads it.
    pub const WRITE: Self = Self(1);
    /// The kernel writes the argument back to user space.
    pub const READ: Self = Self(2);
    pub const READ_WRITE: Self = Self(3);

    /// Builds a direction from its raw two-bit representation.
    pub const fn from_raw(raw: u8) -> Result<Self, InvalidIoctlCode> {
        if raw as u32 >= (1 << DIR_BITS) {
            return Err(InvalidIoctlCode::Direction(raw));
        }
        Ok(Self(raw))
    }

    #[inline(always)]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn reads(self) -> bool {
        (self.0 & Self::READ.0) != 0
    }

    #[inline(always)]
    pub const fn writes(self) -> bool {
        (self.0 & Self::WRITE.0) != 0
    }
}

impl BitOr for Direction {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.0 {
            0 => "NONE",
            1 => "WRITE",
            2 => "READ",
            _ => "READ_WRITE",
        };
        f.write_str(s)
    }
}

/// A code violated the ranges of the request number layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIoctlCode {
    #[error("invalid ioctl direction {0:#x}")]
    Direction(u8),
    #[error("ioctl argument size {0} does not fit in 14 bits")]
    Size(usize),
}

/// A 32-bit ioctl request number.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct IoctlCode(u32);

impl IoctlCode {
    /// Packs the four fields into a request number.
    ///
    /// Panics if `size` exceeds [`MAX_SIZE`]. All of the request constants in
    /// [`crate::ioctl`] are built with this function in a const context, so a
    /// struct that grows too large is a build failure rather than a runtime
    /// one.
    pub const fn new(dir: Direction, size: usize, class: u8, nr: u8) -> Self {
        match Self::try_new(dir, size, class, nr) {
            Ok(code) => code,
            Err(InvalidIoctlCode::Direction(_)) => panic!("invalid ioctl direction"),
            Err(InvalidIoctlCode::Size(_)) => panic!("ioctl argument size does not fit in 14 bits"),
        }
    }

    pub const fn try_new(
        dir: Direction,
        size: usize,
        class: u8,
        nr: u8,
    ) -> Result<Self, InvalidIoctlCode> {
        if dir.0 as u32 >= (1 << DIR_BITS) {
            return Err(InvalidIoctlCode::Direction(dir.0));
        }
        if size > MAX_SIZE {
            return Err(InvalidIoctlCode::Size(size));
        }
        Ok(Self(
            ((dir.0 as u32) << DIR_SHIFT)
                | ((size as u32) << SIZE_SHIFT)
                | ((class as u32) << CLASS_SHIFT)
                | ((nr as u32) << NR_SHIFT),
        ))
    }

    /// Reinterprets a raw request number. Every 32-bit value is a valid code.
    #[inline(always)]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn direction(self) -> Direction {
        Direction(((self.0 >> DIR_SHIFT) & ((1 << DIR_BITS) - 1)) as u8)
    }

    #[inline(always)]
    pub const fn size(self) -> usize {
        ((self.0 >> SIZE_SHIFT) & ((1 << SIZE_BITS) - 1)) as usize
    }

    #[inline(always)]
    pub const fn class(self) -> u8 {
        ((self.0 >> CLASS_SHIFT) & ((1 << CLASS_BITS) - 1)) as u8
    }

    #[inline(always)]
    pub const fn number(self) -> u8 {
        ((self.0 >> NR_SHIFT) & ((1 << NR_BITS) - 1)) as u8
    }
}

impl fmt::Debug for IoctlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IoctlCode({:#010x}: {:?} size={} class={:?} nr={:#04x})",
            self.0,
            self.direction(),
            self.size(),
            self.class() as char,
            self.number()
        )
    }
}

impl fmt::Display for IoctlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
