/*!
GUID newtype used for section-union tags and secondary-data blob tags.
*/

use std::fmt;

use dataview::Pod;

/// A 16-byte GUID, little-endian in its first three fields (the Windows/WDK
/// convention), matching the on-disk layout of `SectionHeader`'s SV_SPECIFIC
/// union member and `DumpBlobHeader.tag`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Pod)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub const NULL: Guid = Guid::new(0, 0, 0, [0; 8]);
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}
