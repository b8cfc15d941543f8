/*!
Component J: emit the output dump — patched header, then the OS memory runs in
`PhysicalMemoryBlock` order — per §4.J.
*/

use crate::dumpheader::DumpHeaderVariant;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::memblock::ValidatedRun;
use crate::physical_reader::PhysicalReader;
use crate::types::PAGE_SIZE;

const WRITE_CHUNK: u64 = 2 * 1024 * 1024;

/// Tracks where the writer is in the output file, per the `DumpWriterState`
/// design note (§4 design notes).
pub struct DumpWriterState {
    pub ddr_file_offset: u64,
    pub secondary_data_offset: u64,
    pub actual_dump_size: u64,
}

/// Patches `header` in place per step 2 of §4.J, then writes it and the OS
/// memory payload to `output`, returning the resulting writer state.
pub fn write(
    output: &mut dyn ByteSource,
    header: &mut DumpHeaderVariant,
    runs: &[ValidatedRun],
    reader: &mut PhysicalReader,
    bug_check: (u32, u32, u32, u32, u32),
    has_secondary_candidates: bool,
) -> Result<DumpWriterState> {
    let header_size = header.header_size();

    let total_pages: u64 = runs.iter().map(|r| r.page_count).sum();
    let actual_dump_size = header_size + total_pages * PAGE_SIZE;

    header.set_required_dump_space(actual_dump_size);
    let (code, p1, p2, p3, p4) = bug_check;
    header.set_bug_check(code, p1, p2, p3, p4);
    header.set_secondary_data_state(if has_secondary_candidates { 1 } else { 0 });
    header.clear_comment();

    let header_bytes = header.to_bytes();
    output.write_at(0, &header_bytes)?;
    output.flush()?;

    let ddr_file_offset = header_size;
    let mut cursor = ddr_file_offset;

    for run in runs {
        let mut remaining = run.page_count * PAGE_SIZE;
        let mut pa = run.base;
        let mut written_pages = 0u64;

        while remaining > 0 {
            let chunk_len = remaining.min(WRITE_CHUNK);
            let mut buf = vec![0u8; chunk_len as usize];
            reader.read(pa, &mut buf)?;
            output.write_at(cursor, &buf)?;

            cursor += chunk_len;
            pa = pa + chunk_len;
            remaining -= chunk_len;
            written_pages += chunk_len / PAGE_SIZE;
        }
        output.flush()?;

        if written_pages != run.page_count {
            return Err(Error(ErrorOrigin::DumpWriter, ErrorKind::PagesWrittenMismatch).log_error(
                format!("expected {} pages, wrote {}", run.page_count, written_pages),
            ));
        }
    }

    Ok(DumpWriterState {
        ddr_file_offset,
        secondary_data_offset: cursor,
        actual_dump_size: cursor,
    })
}
