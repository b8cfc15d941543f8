/*!
Component G: the embedded Windows-style kernel dump header, its 32/64-bit
on-disk layouts, and the DDR scan that locates and validates it.

The real WDK `DUMP_HEADER`/`DUMP_HEADER64` layout is considerably larger and
version-specific; modeling every byte of it is out of scope (symbol resolution
and byte-exact WinDbg interoperability are explicit non-goals, §1). This module
models the fields the data model names and pads the rest of the 0x1000/0x2000
byte window with zeros, per the implementer decision recorded in DESIGN.md.
*/

use dataview::Pod;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::memmap::DdrRegion;
use crate::physical_reader::PhysicalReader;
use crate::types::{Address, PAGE_SIZE};

pub const HEADER32_SIZE: u64 = 0x1000;
pub const HEADER64_SIZE: u64 = 0x2000;

pub const MAX_PHYSICAL_MEMORY_RUNS: usize = 42;

pub const DUMP_SIGNATURE: [u8; 4] = *b"PAGE";
pub const VALID_DUMP32: [u8; 4] = *b"DUMP";
pub const VALID_DUMP64: [u8; 4] = *b"DU64";

pub const DUMP_TYPE_FULL: u32 = 1;
pub const FATAL_ABNORMAL_RESET_ERROR: u32 = 0xEF;

/// The 24-byte magic preceding "PAGEDUMP"/"PAGEDU64" in the raw DDR image (§4.G).
pub const MAGIC: [u8; 24] = [
    0x3B, 0x49, 0x53, 0x53, 0x94, 0x45, 0x2E, 0x30, 0xD4, 0xCB, 0xDA, 0x97, 0xF1, 0x11, 0x02, 0xB5,
    0xE8, 0x36, 0x08, 0x61, 0x88, 0x70, 0x9B, 0x19,
];

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct PhysicalMemoryRun32 {
    pub base_page: u32,
    pub page_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct PhysicalMemoryDescriptor32 {
    pub number_of_runs: u32,
    pub number_of_pages: u32,
    pub runs: [PhysicalMemoryRun32; MAX_PHYSICAL_MEMORY_RUNS],
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct PhysicalMemoryRun64 {
    pub base_page: u64,
    pub page_count: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct PhysicalMemoryDescriptor64 {
    pub number_of_runs: u64,
    pub number_of_pages: u64,
    pub runs: [PhysicalMemoryRun64; MAX_PHYSICAL_MEMORY_RUNS],
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DumpHeader32 {
    pub signature: [u8; 4],
    pub valid_dump: [u8; 4],
    pub major_version: u32,
    pub pae_enabled: u32,
    pub directory_table_base: u32,
    pub kd_debugger_data_block: u32,
    pub physical_memory_block: PhysicalMemoryDescriptor32,
    pub machine_image_type: u32,
    pub number_processors: u32,
    pub bug_check_code: u32,
    pub bug_check_parameter: [u32; 4],
    pub dump_type: u32,
    pub required_dump_space_low: u32,
    pub required_dump_space_high: u32,
    pub comment: [u8; 128],
    pub secondary_data_state: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DumpHeader64 {
    pub signature: [u8; 4],
    pub valid_dump: [u8; 4],
    pub major_version: u32,
    pub pae_enabled: u32,
    pub directory_table_base: u64,
    pub kd_debugger_data_block: u64,
    pub physical_memory_block: PhysicalMemoryDescriptor64,
    pub machine_image_type: u32,
    pub number_processors: u32,
    pub bug_check_code: u32,
    pub bug_check_parameter: [u64; 4],
    pub dump_type: u32,
    pub required_dump_space: u64,
    pub comment: [u8; 128],
    pub secondary_data_state: u32,
}

/// Architecture-parameterized header, a tagged sum type per the design notes.
#[derive(Clone, Copy)]
pub enum DumpHeaderVariant {
    Bits32(DumpHeader32),
    Bits64(DumpHeader64),
}

impl DumpHeaderVariant {
    pub fn word_size(&self) -> u32 {
        match self {
            DumpHeaderVariant::Bits32(_) => 4,
            DumpHeaderVariant::Bits64(_) => 8,
        }
    }

    pub fn header_size(&self) -> u64 {
        match self {
            DumpHeaderVariant::Bits32(_) => HEADER32_SIZE,
            DumpHeaderVariant::Bits64(_) => HEADER64_SIZE,
        }
    }

    pub fn number_processors(&self) -> u32 {
        match self {
            DumpHeaderVariant::Bits32(h) => h.number_processors,
            DumpHeaderVariant::Bits64(h) => h.number_processors,
        }
    }

    pub fn directory_table_base(&self) -> Address {
        match self {
            DumpHeaderVariant::Bits32(h) => Address::from(h.directory_table_base),
            DumpHeaderVariant::Bits64(h) => Address::from(h.directory_table_base),
        }
    }

    pub fn kd_debugger_data_block(&self) -> Address {
        match self {
            DumpHeaderVariant::Bits32(h) => Address::from(h.kd_debugger_data_block),
            DumpHeaderVariant::Bits64(h) => Address::from(h.kd_debugger_data_block),
        }
    }

    pub fn pae_enabled(&self) -> bool {
        match self {
            DumpHeaderVariant::Bits32(h) => h.pae_enabled != 0,
            DumpHeaderVariant::Bits64(_) => false,
        }
    }

    pub fn paging_mode(&self) -> crate::arch::PagingMode {
        match self {
            DumpHeaderVariant::Bits32(h) if h.pae_enabled != 0 => crate::arch::PagingMode::ArmPae,
            DumpHeaderVariant::Bits32(_) => crate::arch::PagingMode::Arm32,
            DumpHeaderVariant::Bits64(_) => crate::arch::PagingMode::Arm64,
        }
    }

    pub fn instance_id(&self) -> u64 {
        let comment = match self {
            DumpHeaderVariant::Bits32(h) => &h.comment,
            DumpHeaderVariant::Bits64(h) => &h.comment,
        };
        u64::from_le_bytes(comment[0..8].try_into().unwrap())
    }

    pub fn required_dump_space_low4(&self) -> [u8; 4] {
        match self {
            DumpHeaderVariant::Bits32(h) => h.required_dump_space_low.to_le_bytes(),
            DumpHeaderVariant::Bits64(h) => {
                let bytes = h.required_dump_space.to_le_bytes();
                [bytes[0], bytes[1], bytes[2], bytes[3]]
            }
        }
    }

    pub fn bug_check_code(&self) -> u32 {
        match self {
            DumpHeaderVariant::Bits32(h) => h.bug_check_code,
            DumpHeaderVariant::Bits64(h) => h.bug_check_code,
        }
    }

    pub fn machine_image_type(&self) -> u32 {
        match self {
            DumpHeaderVariant::Bits32(h) => h.machine_image_type,
            DumpHeaderVariant::Bits64(h) => h.machine_image_type,
        }
    }

    pub fn dump_type(&self) -> u32 {
        match self {
            DumpHeaderVariant::Bits32(h) => h.dump_type,
            DumpHeaderVariant::Bits64(h) => h.dump_type,
        }
    }

    pub fn runs(&self) -> Vec<(u64, u64)> {
        match self {
            DumpHeaderVariant::Bits32(h) => h.physical_memory_block.runs
                [..h.physical_memory_block.number_of_runs as usize]
                .iter()
                .map(|r| (r.base_page as u64, r.page_count as u64))
                .collect(),
            DumpHeaderVariant::Bits64(h) => h.physical_memory_block.runs
                [..h.physical_memory_block.number_of_runs as usize]
                .iter()
                .map(|r| (r.base_page, r.page_count))
                .collect(),
        }
    }

    pub fn set_required_dump_space(&mut self, value: u64) {
        match self {
            DumpHeaderVariant::Bits32(h) => h.required_dump_space_low = value as u32,
            DumpHeaderVariant::Bits64(h) => h.required_dump_space = value,
        }
    }

    pub fn set_bug_check(&mut self, code: u32, p1: u32, p2: u32, p3: u32, p4: u32) {
        match self {
            DumpHeaderVariant::Bits32(h) => {
                h.bug_check_code = code;
                h.bug_check_parameter = [p1, p2, p3, p4];
            }
            DumpHeaderVariant::Bits64(h) => {
                h.bug_check_code = code;
                h.bug_check_parameter = [p1 as u64, p2 as u64, p3 as u64, p4 as u64];
            }
        }
    }

    pub fn set_secondary_data_state(&mut self, state: u32) {
        match self {
            DumpHeaderVariant::Bits32(h) => h.secondary_data_state = state,
            DumpHeaderVariant::Bits64(h) => h.secondary_data_state = state,
        }
    }

    pub fn clear_comment(&mut self) {
        match self {
            DumpHeaderVariant::Bits32(h) => h.comment = [0u8; 128],
            DumpHeaderVariant::Bits64(h) => h.comment = [0u8; 128],
        }
    }

    /// Serializes the modeled prefix into a zero-padded buffer of
    /// `header_size()` bytes, ready to be written verbatim to the output.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_size() as usize];
        match self {
            DumpHeaderVariant::Bits32(h) => {
                let src = dataview::Pod::as_bytes(h);
                buf[..src.len()].copy_from_slice(src);
            }
            DumpHeaderVariant::Bits64(h) => {
                let src = dataview::Pod::as_bytes(h);
                buf[..src.len()].copy_from_slice(src);
            }
        }
        buf
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DumpHeaderStatus {
    Unknown,
    NotFound,
    Invalid,
    NoSvInfo,
    Valid,
}

pub struct LocatedHeader {
    pub header: DumpHeaderVariant,
    pub dump_header_pa: Address,
    pub status: DumpHeaderStatus,
}

fn validate_candidate(
    reader: &mut PhysicalReader,
    dump_header_pa: Address,
    expected_instance_id: Option<u64>,
) -> Option<DumpHeaderVariant> {
    let mut disc = [0u8; 8];
    if reader.read(dump_header_pa, &mut disc).is_err() {
        return None;
    }
    let signature: [u8; 4] = disc[0..4].try_into().unwrap();
    if signature != DUMP_SIGNATURE {
        return None;
    }
    let valid_dump: [u8; 4] = disc[4..8].try_into().unwrap();

    let header = if valid_dump == VALID_DUMP32 {
        let mut buf = vec![0u8; std::mem::size_of::<DumpHeader32>()];
        if reader.read(dump_header_pa, &mut buf).is_err() {
            return None;
        }
        DumpHeaderVariant::Bits32(*dataview::DataView::from(&buf[..]).get::<DumpHeader32>(0))
    } else if valid_dump == VALID_DUMP64 {
        let mut buf = vec![0u8; std::mem::size_of::<DumpHeader64>()];
        if reader.read(dump_header_pa, &mut buf).is_err() {
            return None;
        }
        DumpHeaderVariant::Bits64(*dataview::DataView::from(&buf[..]).get::<DumpHeader64>(0))
    } else {
        return None;
    };

    if header.bug_check_code() != FATAL_ABNORMAL_RESET_ERROR {
        log::info!("dump header locator: candidate at {:x} has wrong bugcheck code", dump_header_pa);
        return None;
    }
    if header.dump_type() != DUMP_TYPE_FULL {
        return None;
    }
    if header.required_dump_space_low4() != DUMP_SIGNATURE {
        return None;
    }
    if let Some(expected) = expected_instance_id {
        if header.instance_id() != expected {
            log::info!(
                "dump header locator: candidate at {:x} instance id mismatch",
                dump_header_pa
            );
            return None;
        }
    }

    Some(header)
}

/// Scans every DDR region at page granularity for the magic signature (§4.G).
/// `expected_instance_id` comes from the `DeviceSpecificInfo` trailer or an
/// external XML file; when `None`, instance-id checking is skipped (rule 6 is
/// vacuously satisfied) and the first structurally valid candidate wins.
pub fn locate(
    reader: &mut PhysicalReader,
    regions: &[DdrRegion],
    expected_instance_id: Option<u64>,
) -> Result<LocatedHeader> {
    const CHUNK: u64 = 8 * 1024 * 1024;

    for region in regions {
        let mut pos = region.base.as_u64();
        while pos <= region.end.as_u64() {
            let chunk_end = (pos + CHUNK).min(region.end.as_u64() + 1);

            let mut probe = pos;
            while probe + MAGIC.len() as u64 + 8 <= chunk_end + 32 && probe <= region.end.as_u64() {
                let mut buf = [0u8; 32];
                if reader.read(Address::from(probe), &mut buf).is_ok() && buf[0..24] == MAGIC {
                    let dump_header_pa = Address::from(probe) + MAGIC.len() as u64;
                    if let Some(header) =
                        validate_candidate(reader, dump_header_pa, expected_instance_id)
                    {
                        return Ok(LocatedHeader {
                            header,
                            dump_header_pa,
                            status: DumpHeaderStatus::Valid,
                        });
                    }
                }
                probe += PAGE_SIZE;
            }

            pos = chunk_end;
        }
    }

    Err(Error(ErrorOrigin::DumpHeaderLocator, ErrorKind::DumpHeaderNotFound)
        .log_warn("exhausted ddr scan without a valid candidate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CursorByteSource;
    use crate::memmap::RegionKind;

    fn build_image(header: &DumpHeader32, instance_id: u64) -> Vec<u8> {
        let mut header = *header;
        header.comment[0..8].copy_from_slice(&instance_id.to_le_bytes());

        let mut data = vec![0u8; 0x10_0000];
        let magic_offset = 0x1000usize;
        data[magic_offset..magic_offset + MAGIC.len()].copy_from_slice(&MAGIC);
        let header_offset = magic_offset + MAGIC.len();
        let header_bytes = dataview::Pod::as_bytes(&header);
        data[header_offset..header_offset + header_bytes.len()].copy_from_slice(header_bytes);
        data
    }

    fn base_header() -> DumpHeader32 {
        DumpHeader32 {
            signature: DUMP_SIGNATURE,
            valid_dump: VALID_DUMP32,
            major_version: 15,
            pae_enabled: 0,
            directory_table_base: 0x1000,
            kd_debugger_data_block: 0x2000,
            physical_memory_block: PhysicalMemoryDescriptor32 {
                number_of_runs: 0,
                number_of_pages: 0,
                runs: [PhysicalMemoryRun32 { base_page: 0, page_count: 0 }; MAX_PHYSICAL_MEMORY_RUNS],
            },
            machine_image_type: 0x1c2,
            number_processors: 1,
            bug_check_code: FATAL_ABNORMAL_RESET_ERROR,
            bug_check_parameter: [0; 4],
            dump_type: DUMP_TYPE_FULL,
            required_dump_space_low: u32::from_le_bytes(DUMP_SIGNATURE),
            required_dump_space_high: 0,
            comment: [0u8; 128],
            secondary_data_state: 0,
        }
    }

    #[test]
    fn locates_and_validates_candidate() {
        let data = build_image(&base_header(), 0xDEAD_BEEF_0000_0001);
        let region = DdrRegion {
            base: Address::NULL,
            end: Address::from(data.len() as u64 - 1),
            size: data.len() as u64,
            offset: 0,
            contiguous: true,
            kind: RegionKind::Na,
            ddr_index: 0,
        };
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut reader = PhysicalReader::new(&mut src, &regions);
        let located = locate(&mut reader, &regions, Some(0xDEAD_BEEF_0000_0001)).unwrap();
        assert_eq!(located.status, DumpHeaderStatus::Valid);
    }

    #[test]
    fn rejects_wrong_instance_id_then_finds_next() {
        // two magic hits: first with a mismatching instance id, second correct
        let mut data = build_image(&base_header(), 0xDEAD_BEEF_0000_0002);
        let second = build_image(&base_header(), 0xDEAD_BEEF_0000_0001);
        data.extend_from_slice(&second[0x1000..]);

        let region = DdrRegion {
            base: Address::NULL,
            end: Address::from(data.len() as u64 - 1),
            size: data.len() as u64,
            offset: 0,
            contiguous: true,
            kind: RegionKind::Na,
            ddr_index: 0,
        };
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut reader = PhysicalReader::new(&mut src, &regions);
        let located = locate(&mut reader, &regions, Some(0xDEAD_BEEF_0000_0001)).unwrap();
        assert_eq!(located.header.instance_id(), 0xDEAD_BEEF_0000_0001);
    }

    #[test]
    fn no_candidate_is_not_found() {
        let data = vec![0u8; 0x10_000];
        let region = DdrRegion {
            base: Address::NULL,
            end: Address::from(data.len() as u64 - 1),
            size: data.len() as u64,
            offset: 0,
            contiguous: true,
            kind: RegionKind::Na,
            ddr_index: 0,
        };
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut reader = PhysicalReader::new(&mut src, &regions);
        let err = locate(&mut reader, &regions, None).unwrap_err();
        assert_eq!(err.1, ErrorKind::DumpHeaderNotFound);
    }
}
