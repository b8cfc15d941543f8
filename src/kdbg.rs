/*!
Component L: locate, validate, and patch the embedded `KDDEBUGGER_DATA64`
block.

The full WDK structure carries dozens of fields; per the implementer decision
recorded in DESIGN.md (mirroring the approach taken for [`crate::dumpheader`])
only the fields this crate actually consumes are modeled, padded to one of the
whitelisted on-disk sizes. `KDDEBUGGER_DATA64`'s fields are 64-bit wide
regardless of the target dump's bitness — that width is what "64" in the name
refers to, not the dump header.
*/

use dataview::Pod;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::physical_reader::PhysicalReader;
use crate::types::{Address, PAGE_SIZE};
use crate::virt::VirtualReader;

pub const OWNER_TAG: [u8; 4] = *b"KDBG";

pub const BUGCHECK_CODE_IDX: usize = 0;
pub const BUGCHECK_PARAM1_IDX: usize = 1;
pub const BUGCHECK_PARAM2_IDX: usize = 2;
pub const BUGCHECK_PARAM3_IDX: usize = 3;
pub const BUGCHECK_PARAM4_IDX: usize = 4;
pub const BUGCHECK_ARRAY_SIZE: usize = 5;

/// Whitelisted `KDDEBUGGER_DATA64.Header.Size` values, newest first. Literal
/// sizes are an implementer choice (see DESIGN.md) — the real WDK values
/// depend on a Windows revision this crate never targets.
pub const KDBG_SIZE_CURRENT: u32 = 0x340;
pub const KDBG_SIZE_WIN81: u32 = 0x330;
pub const KDBG_SIZE_WIN80: u32 = 0x318;
pub const KDBG_SIZE_WIN70: u32 = 0x2F0;
pub const KDBG_SIZE_LEGACY: u32 = 0x290;

fn is_whitelisted_size(size: u32) -> bool {
    matches!(
        size,
        KDBG_SIZE_CURRENT | KDBG_SIZE_WIN81 | KDBG_SIZE_WIN80 | KDBG_SIZE_WIN70 | KDBG_SIZE_LEGACY
    )
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct RawKdDebuggerDataBlock {
    pub list_next: u64,
    pub list_blink: u64,
    pub owner_tag: [u8; 4],
    pub size: u32,
    pub ki_processor_block: u64,
    pub offset_prcb_context: u64,
    pub ki_bugcheck_data: u64,
}

#[derive(Clone, Copy)]
pub struct KdDebuggerDataBlock {
    pub raw: RawKdDebuggerDataBlock,
    /// Physical address the decoded copy was ultimately read from (and will be
    /// written back to).
    pub resolved_pa: Address,
}

impl KdDebuggerDataBlock {
    pub fn ki_processor_block(&self) -> Address {
        Address::from(self.raw.ki_processor_block)
    }

    pub fn offset_prcb_context(&self) -> u64 {
        self.raw.offset_prcb_context
    }

    pub fn ki_bugcheck_data(&self) -> Address {
        Address::from(self.raw.ki_bugcheck_data)
    }
}

fn validate(buf: &[u8]) -> Option<RawKdDebuggerDataBlock> {
    if buf.len() < std::mem::size_of::<RawKdDebuggerDataBlock>() {
        return None;
    }
    let raw = *dataview::DataView::from(buf).get::<RawKdDebuggerDataBlock>(0);
    if raw.owner_tag != OWNER_TAG {
        return None;
    }
    if !is_whitelisted_size(raw.size) {
        return None;
    }
    Some(raw)
}

/// Resolves the data block per §4.L: first via `kd_block_va` through
/// `VirtualReader`, falling back to `dump_header_pa + PAGE_SIZE` physical if
/// the VA copy fails to validate. Both paths read through the same
/// `VirtualReader`'s underlying physical reader, so the caller only ever
/// needs one live reader over the input.
pub fn locate(
    vreader: &mut VirtualReader,
    kd_block_va: Address,
    dump_header_pa: Address,
) -> Result<KdDebuggerDataBlock> {
    let size = std::mem::size_of::<RawKdDebuggerDataBlock>();

    if !kd_block_va.is_null() {
        let mut buf = vec![0u8; size];
        if let Ok(pa) = vreader.read_page_local(kd_block_va, &mut buf) {
            if let Some(raw) = validate(&buf) {
                return Ok(KdDebuggerDataBlock { raw, resolved_pa: pa });
            }
        }
        log::info!("kd debugger data block: va copy failed to validate, falling back to pa");
    }

    let fallback_pa = dump_header_pa + PAGE_SIZE;
    let mut buf = vec![0u8; size];
    vreader.physical().read(fallback_pa, &mut buf)?;
    let raw = validate(&buf).ok_or_else(|| {
        Error(ErrorOrigin::KdDebuggerDataBlock, ErrorKind::InvalidKdBlock)
            .log_error(format!("no valid kdbg block at pa=0x{:x}", fallback_pa))
    })?;

    Ok(KdDebuggerDataBlock { raw, resolved_pa: fallback_pa })
}

/// Patches the bugcheck array in place and writes both it and the decoded
/// data block back to the output by physical address (§4.L, paragraphs 2-3).
/// `ki_bugcheck_data` is a VA, so a `VirtualReader` resolves it to a PA before
/// the patched array is written back.
pub fn patch_bugcheck_and_writeback(
    block: &KdDebuggerDataBlock,
    vreader: &mut VirtualReader,
    output: &mut crate::physical_reader::OutputWriter,
    bug_check: (u32, u32, u32, u32, u32),
) -> Result<()> {
    let (code, p1, p2, p3, p4) = bug_check;
    let mut array = [0u32; BUGCHECK_ARRAY_SIZE];
    array[BUGCHECK_CODE_IDX] = code;
    array[BUGCHECK_PARAM1_IDX] = p1;
    array[BUGCHECK_PARAM2_IDX] = p2;
    array[BUGCHECK_PARAM3_IDX] = p3;
    array[BUGCHECK_PARAM4_IDX] = p4;

    let bugcheck_va = block.ki_bugcheck_data();
    if !bugcheck_va.is_null() {
        let mut existing = vec![0u8; BUGCHECK_ARRAY_SIZE * 4];
        match vreader.read_page_local(bugcheck_va, &mut existing) {
            Ok(bugcheck_pa) => {
                let array_bytes: Vec<u8> = array.iter().flat_map(|v| v.to_le_bytes()).collect();
                output.write_by_pa(bugcheck_pa, &array_bytes)?;
            }
            Err(e) => {
                e.log_warn("could not resolve ki_bugcheck_data va, skipping bugcheck patch");
            }
        }
    }

    let decoded_bytes = dataview::Pod::as_bytes(&block.raw);
    output.write_by_pa(block.resolved_pa, decoded_bytes)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::PagingMode;
    use crate::io::CursorByteSource;
    use crate::memmap::{DdrRegion, RegionKind};
    use crate::physical_reader::OutputRun;

    fn flat_region(size: u64) -> DdrRegion {
        DdrRegion {
            base: Address::NULL,
            end: Address::from(size - 1),
            size,
            offset: 0,
            contiguous: true,
            kind: RegionKind::Na,
            ddr_index: 0,
        }
    }

    fn sample_block(size: u32) -> RawKdDebuggerDataBlock {
        RawKdDebuggerDataBlock {
            list_next: 0,
            list_blink: 0,
            owner_tag: OWNER_TAG,
            size,
            ki_processor_block: 0x8000_1000,
            offset_prcb_context: 0x338,
            ki_bugcheck_data: 0x8000_2000,
        }
    }

    #[test]
    fn falls_back_to_physical_when_va_read_fails() {
        let dump_header_pa = Address::from(0x1000u64);
        let fallback_pa = dump_header_pa + PAGE_SIZE;

        let mut data = vec![0u8; 0x10_0000];
        let block = sample_block(KDBG_SIZE_CURRENT);
        let bytes = dataview::Pod::as_bytes(&block);
        data[fallback_pa.as_usize()..fallback_pa.as_usize() + bytes.len()].copy_from_slice(bytes);

        let region = flat_region(data.len() as u64);
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut preader = PhysicalReader::new(&mut src, &regions);
        let mut vreader = VirtualReader::new(&mut preader, PagingMode::Arm64, Address::NULL);

        // kd_block_va left NULL so VA path is skipped outright.
        let located = locate(&mut vreader, Address::NULL, dump_header_pa).unwrap();
        assert_eq!(located.raw.size, KDBG_SIZE_CURRENT);
        assert_eq!(located.ki_processor_block().as_u64(), 0x8000_1000);
    }

    #[test]
    fn rejects_unrecognized_size() {
        let block = sample_block(0x123);
        let bytes = dataview::Pod::as_bytes(&block);
        assert!(validate(bytes).is_none());
    }

    #[test]
    fn patch_and_writeback_round_trips_decoded_block() {
        let mut block = sample_block(KDBG_SIZE_CURRENT);
        block.ki_bugcheck_data = 0; // VA unresolvable without a real page table; skip path
        let block = KdDebuggerDataBlock {
            raw: block,
            resolved_pa: Address::from(0x2000u64),
        };
        let mut preader_src = CursorByteSource::new(vec![0u8; 0x10_000]);
        let regions = vec![flat_region(0x10_000)];
        let mut preader = PhysicalReader::new(&mut preader_src, &regions);
        let mut vreader = VirtualReader::new(&mut preader, PagingMode::Arm64, Address::NULL);

        let mut out_src = CursorByteSource::new(vec![0u8; 0x10_000]);
        let runs = vec![OutputRun {
            base: Address::NULL,
            end: Address::from(0xFFFFu64),
        }];
        let mut output = crate::physical_reader::OutputWriter::new(&mut out_src, &runs, 0);

        patch_bugcheck_and_writeback(&block, &mut vreader, &mut output, (0xEF, 1, 2, 3, 4))
            .unwrap();
    }
}
