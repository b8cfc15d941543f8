/*!
Abstraction over a physical or virtual address.
*/

use std::fmt;
use std::ops;

/// A 64-bit address on the target system. Used uniformly for physical addresses,
/// virtual addresses, and page-table entry contents.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(transparent)]
pub struct Address(u64);

impl From<u32> for Address {
    fn from(item: u32) -> Self {
        Address(u64::from(item))
    }
}

impl From<u64> for Address {
    fn from(item: u64) -> Self {
        Address(item)
    }
}

impl From<usize> for Address {
    fn from(item: usize) -> Self {
        Address(item as u64)
    }
}

impl Address {
    pub const NULL: Address = Address(0);
    pub const INVALID: Address = Address(!0);

    #[inline]
    pub const fn null() -> Self {
        Address::NULL
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Rounds down to the nearest multiple of `page_size`.
    #[inline]
    pub fn as_page_aligned(self, page_size: u64) -> Address {
        Address(self.0 - (self.0 % page_size))
    }

    /// Extracts bits `[start, end)` (end exclusive) and shifts them down to bit 0.
    pub fn extract_bits(self, start: u32, end: u32) -> u64 {
        let width = end - start;
        let mask = if width >= 64 { !0u64 } else { (1u64 << width) - 1 };
        (self.0 >> start) & mask
    }
}

impl ops::Add<u64> for Address {
    type Output = Address;
    fn add(self, rhs: u64) -> Address {
        Address(self.0 + rhs)
    }
}

impl ops::Add<usize> for Address {
    type Output = Address;
    fn add(self, rhs: usize) -> Address {
        Address(self.0 + rhs as u64)
    }
}

impl ops::Sub<Address> for Address {
    type Output = u64;
    fn sub(self, rhs: Address) -> u64 {
        self.0 - rhs.0
    }
}

impl ops::Sub<u64> for Address {
    type Output = Address;
    fn sub(self, rhs: u64) -> Address {
        Address(self.0 - rhs)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}
