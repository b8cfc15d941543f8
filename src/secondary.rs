/*!
Component K: append the secondary-data blob stream after the DDR payload —
a `DumpBlobFileHeader` followed by five tagged `DumpBlobHeader` + payload
pairs, per §4.K.
*/

use dataview::Pod;

use crate::completemap::CompleteMemoryRegion;
use crate::container::SectionHeader;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::memmap::{DdrRegion, RegionKind};
use crate::physical_reader::PhysicalReader;
use crate::svtable;
use crate::types::Guid;

pub const BLOB_FILE_SIGNATURE1: [u8; 4] = *b"SDBF";
pub const BLOB_FILE_SIGNATURE2: [u8; 4] = *b"MRWD";
pub const BLOB_BUILD_NUMBER: u32 = 1205;

/// Arbitrary-but-stable literals for the blob-tag namespace (distinct from
/// the SV-section GUID table in [`crate::svtable`]); these were not present
/// in `original_source` (§9 Open Questions) and are recorded here verbatim,
/// matching DESIGN.md.
pub const RAW_DUMP_TABLE_GUID: Guid =
    Guid::new(0x2F4C8A10, 0x9B01, 0x4E22, [0x8A, 0x77, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
pub const CPU_CONTEXT_GUID: Guid =
    Guid::new(0x2F4C8A11, 0x9B01, 0x4E22, [0x8A, 0x77, 0x01, 0x02, 0x03, 0x04, 0x05, 0x07]);
pub const MEMORY_MAP_GUID: Guid =
    Guid::new(0x2F4C8A12, 0x9B01, 0x4E22, [0x8A, 0x77, 0x01, 0x02, 0x03, 0x04, 0x05, 0x08]);
pub const NON_OS_DDR_GUID: Guid =
    Guid::new(0x2F4C8A13, 0x9B01, 0x4E22, [0x8A, 0x77, 0x01, 0x02, 0x03, 0x04, 0x05, 0x09]);

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DumpBlobFileHeader {
    pub signature1: [u8; 4],
    pub signature2: [u8; 4],
    pub header_size: u32,
    pub build_number: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct DumpBlobHeader {
    pub header_size: u32,
    pub tag: Guid,
    pub data_size: u32,
    pub pre_pad: u32,
    pub post_pad: u32,
}

struct Cursor<'a> {
    output: &'a mut dyn ByteSource,
    offset: u64,
    blob_count: u32,
}

impl<'a> Cursor<'a> {
    fn write_blob(&mut self, tag: Guid, payload: &[u8]) -> Result<()> {
        let header = DumpBlobHeader {
            header_size: std::mem::size_of::<DumpBlobHeader>() as u32,
            tag,
            data_size: payload.len() as u32,
            pre_pad: 0,
            post_pad: 0,
        };
        let header_bytes = dataview::Pod::as_bytes(&header);
        self.output.write_at(self.offset, header_bytes)?;
        self.offset += header_bytes.len() as u64;

        self.output.write_at(self.offset, payload)?;
        self.offset += payload.len() as u64;
        self.output.flush()?;

        self.blob_count += 1;
        Ok(())
    }
}

/// Writes the full blob stream starting at `offset`. `raw_dump_table_bytes`
/// is the original container's `RawDumpHeader` + `SectionHeader` table,
/// `legacy_cpu_context` is the raw legacy AP_REG structure bytes when one was
/// found, `sv_sections` names each SV_SPECIFIC section to copy verbatim
/// (read directly from `input` at the section's own container `offset` — a
/// SV_SPECIFIC section's union holds a GUID, not a physical address, so it is
/// never reachable through a physical-address read), and
/// `regions`/`complete_map` drive the last two blobs (`regions` backs a
/// `PhysicalReader` built locally, after the direct SV reads are done, so the
/// two read strategies over `input` never need to be borrowed at once).
/// Returns the total bytes written (including headers).
pub fn write(
    output: &mut dyn ByteSource,
    offset: u64,
    raw_dump_table_bytes: &[u8],
    legacy_cpu_context: Option<&[u8]>,
    sv_sections: &[(usize, &SectionHeader)],
    input: &mut dyn ByteSource,
    regions: &[DdrRegion],
    complete_map: &[CompleteMemoryRegion],
) -> Result<u64> {
    let file_header = DumpBlobFileHeader {
        signature1: BLOB_FILE_SIGNATURE1,
        signature2: BLOB_FILE_SIGNATURE2,
        header_size: std::mem::size_of::<DumpBlobFileHeader>() as u32,
        build_number: BLOB_BUILD_NUMBER,
    };
    let file_header_bytes = dataview::Pod::as_bytes(&file_header);
    output.write_at(offset, file_header_bytes)?;
    output.flush()?;

    let mut cursor = Cursor {
        output,
        offset: offset + file_header_bytes.len() as u64,
        blob_count: 0,
    };

    // 1. RawDumpTable
    cursor.write_blob(RAW_DUMP_TABLE_GUID, raw_dump_table_bytes)?;

    // 2. CpuContext, when a legacy AP_REG structure was captured
    if let Some(legacy) = legacy_cpu_context {
        cursor.write_blob(CPU_CONTEXT_GUID, legacy)?;
    }

    // 3. SV_SPECIFIC sections, each tagged by its own GUID, payload prefixed
    // by its 20-byte name.
    for (_, section) in sv_sections {
        let guid = section.guid();
        let name = svtable::name_for(&guid);
        let mut payload = vec![0u8; crate::container::RAW_DUMP_SECTION_HEADER_NAME_LENGTH];
        let name_bytes = name.as_bytes();
        let n = name_bytes.len().min(payload.len());
        payload[..n].copy_from_slice(&name_bytes[..n]);

        let mut section_bytes = vec![0u8; section.size as usize];
        input.read_at(section.offset, &mut section_bytes)?;
        payload.extend_from_slice(&section_bytes);

        cursor.write_blob(guid, &payload)?;
    }

    // 4. MemoryMap
    let map_bytes: Vec<u8> = complete_map
        .iter()
        .flat_map(|r| {
            let mut buf = Vec::with_capacity(24);
            buf.extend_from_slice(&r.base.as_u64().to_le_bytes());
            buf.extend_from_slice(&r.end.as_u64().to_le_bytes());
            buf.extend_from_slice(&(r.kind as u32).to_le_bytes());
            buf.extend_from_slice(&0u32.to_le_bytes()); // pad to 24 bytes
            buf
        })
        .collect();
    cursor.write_blob(MEMORY_MAP_GUID, &map_bytes)?;

    // 5. NonOSMemory: concatenated bytes of every NonOs region, read back from
    // the input container in complete-map order.
    let mut nonos_bytes = Vec::new();
    {
        let mut input_reader = PhysicalReader::new(input, regions);
        for region in complete_map.iter().filter(|r| r.kind == RegionKind::NonOs) {
            let size = (region.end - region.base) + 1;
            let mut buf = vec![0u8; size as usize];
            input_reader.read(region.base, &mut buf)?;
            nonos_bytes.extend_from_slice(&buf);
        }
    }
    cursor.write_blob(NON_OS_DDR_GUID, &nonos_bytes)?;

    let expected_blobs = 1 + legacy_cpu_context.is_some() as u32 + sv_sections.len() as u32 + 2;
    if cursor.blob_count != expected_blobs {
        return Err(Error(ErrorOrigin::SecondaryDataWriter, ErrorKind::BlobSizeMismatch).log_error(
            format!("expected {} blobs, wrote {}", expected_blobs, cursor.blob_count),
        ));
    }

    Ok(cursor.offset - offset)
}
