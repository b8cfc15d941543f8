/*!
Component B: parse and validate the raw-dump container's `RawDumpHeader` and its
`SectionHeader` table, classifying sections and accumulating statistics.

The exact on-disk byte layout of `RawDumpHeader`/`SectionHeader` was not
recoverable from the available original sources (see DESIGN.md); the field
order below follows the data model's literal list and pads explicitly so the
layout is unambiguous and `Pod`-derivable.
*/

use std::convert::TryInto;

use dataview::Pod;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::types::Guid;

pub const RAW_DUMP_SIGNATURE: u64 = u64::from_le_bytes(*b"RAW_DMP!");
pub const RAW_DUMP_SECTION_HEADER_VERSION: u32 = 1;
pub const RAW_DUMP_SECTION_HEADER_NAME_LENGTH: usize = 20;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct DumpFlags: u32 {
        const VALID = 0x1;
        const INSUFFICIENT_STORAGE = 0x2;
    }
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SectionType {
    Reserved = 0,
    DdrRange = 1,
    CpuContext = 2,
    SvSpecific = 3,
}

impl SectionType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(SectionType::Reserved),
            1 => Some(SectionType::DdrRange),
            2 => Some(SectionType::CpuContext),
            3 => Some(SectionType::SvSpecific),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod)]
pub struct RawDumpHeader {
    pub signature: u64,
    pub version: u32,
    pub flags: u32,
    pub dump_size: u64,
    pub total_dump_size_required: u64,
    pub sections_count: u32,
    _reserved0: u32,
    pub os_data: u64,
    pub cpu_context: u64,
    pub reset_trigger: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct SectionHeader {
    pub flags: u32,
    pub version: u32,
    pub section_type: u32,
    _reserved0: u32,
    pub offset: u64,
    pub size: u64,
    pub name: [u8; RAW_DUMP_SECTION_HEADER_NAME_LENGTH],
    _reserved1: [u8; 4],
    union_bytes: [u8; 16],
}

impl std::fmt::Debug for SectionHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SectionHeader")
            .field("flags", &self.flags)
            .field("version", &self.version)
            .field("section_type", &self.section_type)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("name", &self.name_str())
            .finish()
    }
}

impl SectionHeader {
    /// Constructs a section header from its logical fields, encoding the
    /// type-tagged union as either a base physical address or a GUID depending
    /// on `kind`. Used by the container parser's own tests and by every other
    /// module's fixtures that need a section to build on top of.
    pub fn new(
        flags: DumpFlags,
        version: u32,
        kind: SectionType,
        offset: u64,
        size: u64,
        name: &str,
        base_physical_address: u64,
        guid: Guid,
    ) -> Self {
        let mut union_bytes = [0u8; 16];
        match kind {
            SectionType::DdrRange => {
                union_bytes[0..8].copy_from_slice(&base_physical_address.to_le_bytes());
            }
            SectionType::SvSpecific => {
                union_bytes.copy_from_slice(dataview::Pod::as_bytes(&guid));
            }
            _ => {}
        }
        let mut name_bytes = [0u8; RAW_DUMP_SECTION_HEADER_NAME_LENGTH];
        let src = name.as_bytes();
        let n = src.len().min(name_bytes.len());
        name_bytes[..n].copy_from_slice(&src[..n]);

        SectionHeader {
            flags: flags.bits(),
            version,
            section_type: kind as u32,
            _reserved0: 0,
            offset,
            size,
            name: name_bytes,
            _reserved1: [0u8; 4],
            union_bytes,
        }
    }

    pub fn flags(&self) -> DumpFlags {
        DumpFlags::from_bits_truncate(self.flags)
    }

    pub fn kind(&self) -> Option<SectionType> {
        SectionType::from_u32(self.section_type)
    }

    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Valid only when `kind() == Some(SectionType::DdrRange)`.
    pub fn base_physical_address(&self) -> u64 {
        u64::from_le_bytes(self.union_bytes[0..8].try_into().unwrap())
    }

    /// Valid only when `kind() == Some(SectionType::SvSpecific)`.
    pub fn guid(&self) -> Guid {
        *dataview::DataView::from(&self.union_bytes[..]).get::<Guid>(0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CpuArch {
    Intel,
    Arm,
    Arm64,
    Amd64,
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct SectionStats {
    pub ddr_count: u32,
    pub cpu_context_count: u32,
    pub sv_count: u32,

    pub total_ddr: u64,
    pub total_cpu_context: u64,
    pub total_sv: u64,
    pub largest_sv: u64,

    pub cpu_arch: Option<CpuArch>,

    pub invalid_version: u32,
    pub invalid_flags: u32,
    pub invalid_type: u32,
    pub insufficient_storage: u32,
    pub ddr_fragmentation: u32,
    pub ddr_overlap: u32,
}

pub struct ParsedContainer {
    pub header: RawDumpHeader,
    pub sections: Vec<SectionHeader>,
    pub stats: SectionStats,
}

/// Parses and validates the container per §4.B. Structural failures (bad magic,
/// zero sections, etc.) abort immediately; per-section rule violations are
/// tallied in `SectionStats` and do not themselves stop the walk.
pub fn parse(source: &mut dyn ByteSource) -> Result<ParsedContainer> {
    let mut header_bytes = [0u8; std::mem::size_of::<RawDumpHeader>()];
    source.read_at(0, &mut header_bytes)?;
    let header = *dataview::DataView::from(&header_bytes[..]).get::<RawDumpHeader>(0);

    if header.signature != RAW_DUMP_SIGNATURE {
        return Err(Error(ErrorOrigin::Container, ErrorKind::BadSignature)
            .log_error(format!("signature=0x{:016x}", header.signature)));
    }
    let flags = DumpFlags::from_bits_truncate(header.flags);
    if flags.is_empty() {
        return Err(Error(ErrorOrigin::Container, ErrorKind::BadFlags)
            .log_error(format!("flags=0x{:x}", header.flags)));
    }
    if header.dump_size == 0 {
        return Err(Error(ErrorOrigin::Container, ErrorKind::DumpSizeZero).log_error("dump_size"));
    }
    if header.sections_count == 0 {
        return Err(
            Error(ErrorOrigin::Container, ErrorKind::ZeroSections).log_error("sections_count")
        );
    }

    let section_header_size = std::mem::size_of::<SectionHeader>();
    let table_size = section_header_size * header.sections_count as usize;
    let mut table_bytes = vec![0u8; table_size];
    source.read_at(std::mem::size_of::<RawDumpHeader>() as u64, &mut table_bytes)?;

    let view = dataview::DataView::from(&table_bytes[..]);
    let mut sections = Vec::with_capacity(header.sections_count as usize);
    for i in 0..header.sections_count as usize {
        sections.push(*view.get::<SectionHeader>(i * section_header_size));
    }

    let mut stats = SectionStats::default();
    let last_index = sections.len() - 1;
    for (i, section) in sections.iter().enumerate() {
        if section.version != RAW_DUMP_SECTION_HEADER_VERSION {
            stats.invalid_version += 1;
            log::warn!("container: invalid section version at index {}", i);
        }

        let section_flags = section.flags();
        if (section_flags & (DumpFlags::VALID | DumpFlags::INSUFFICIENT_STORAGE)).is_empty() {
            stats.invalid_flags += 1;
            log::warn!("container: invalid section flags at index {}", i);
        }
        if section_flags.contains(DumpFlags::INSUFFICIENT_STORAGE) && i != last_index {
            stats.insufficient_storage += 1;
            log::warn!(
                "container: insufficient-storage flag on non-last section {}",
                i
            );
        }

        match section.kind() {
            Some(SectionType::DdrRange) => {
                stats.ddr_count += 1;
                stats.total_ddr += section.size;
            }
            Some(SectionType::CpuContext) => {
                stats.cpu_context_count += 1;
                stats.total_cpu_context += section.size;
                if stats.cpu_arch.is_none() {
                    stats.cpu_arch = Some(CpuArch::Unknown);
                }
            }
            Some(SectionType::SvSpecific) => {
                stats.sv_count += 1;
                stats.total_sv += section.size;
                stats.largest_sv = stats.largest_sv.max(section.size);
            }
            Some(SectionType::Reserved) | None => {
                stats.invalid_type += 1;
                log::warn!("container: invalid section type at index {}", i);
            }
        }
    }

    Ok(ParsedContainer {
        header,
        sections,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CursorByteSource;

    fn make_section(offset: u64, size: u64, base_pa: u64, kind: u32) -> SectionHeader {
        let mut union_bytes = [0u8; 16];
        union_bytes[0..8].copy_from_slice(&base_pa.to_le_bytes());
        SectionHeader {
            flags: DumpFlags::VALID.bits(),
            version: RAW_DUMP_SECTION_HEADER_VERSION,
            section_type: kind,
            _reserved0: 0,
            offset,
            size,
            name: [0u8; 20],
            _reserved1: [0u8; 4],
            union_bytes,
        }
    }

    fn build_container(sections: &[SectionHeader]) -> Vec<u8> {
        let header = RawDumpHeader {
            signature: RAW_DUMP_SIGNATURE,
            version: 1,
            flags: DumpFlags::VALID.bits(),
            dump_size: 0x1000,
            total_dump_size_required: 0x1000,
            sections_count: sections.len() as u32,
            _reserved0: 0,
            os_data: 0,
            cpu_context: 0,
            reset_trigger: 0,
        };
        let mut buf = dataview::Pod::as_bytes(&header).to_vec();
        for s in sections {
            buf.extend_from_slice(dataview::Pod::as_bytes(s));
        }
        buf
    }

    #[test]
    fn parses_happy_path() {
        let sections = vec![make_section(0x1000, 0x4000_0000, 0x0, SectionType::DdrRange as u32)];
        let bytes = build_container(&sections);
        let mut src = CursorByteSource::new(bytes);
        let parsed = parse(&mut src).unwrap();
        assert_eq!(parsed.stats.ddr_count, 1);
        assert_eq!(parsed.stats.total_ddr, 0x4000_0000);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = build_container(&[make_section(0x1000, 0x1000, 0, 1)]);
        bytes[0] = 0; // corrupt signature
        let mut src = CursorByteSource::new(bytes);
        let err = parse(&mut src).unwrap_err();
        assert_eq!(err.1, ErrorKind::BadSignature);
    }

    #[test]
    fn tallies_invalid_type_without_aborting() {
        let sections = vec![make_section(0x1000, 0x1000, 0, 0xFF)];
        let bytes = build_container(&sections);
        let mut src = CursorByteSource::new(bytes);
        let parsed = parse(&mut src).unwrap();
        assert_eq!(parsed.stats.invalid_type, 1);
    }
}
