/*!
Component M: resolve each CPU's `CONTEXT` structure, optionally overlay it
with AP_REG register state, and write the merged copy back into the output.
*/

use crate::cpu_context::{Amd64Context, Arm64Context, ArmContext, Architecture, X86Context};
use crate::dumpheader::DumpHeaderVariant;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::kdbg::KdDebuggerDataBlock;
use crate::physical_reader::{OutputWriter, PhysicalReader};
use crate::types::Address;
use crate::virt::VirtualReader;

/// Either AP_REG overlay shape, keyed by CPU index, as produced by
/// [`crate::apreg::parse_legacy`] / [`crate::apreg::parse_modern_tree`].
pub enum Overlay {
    Arm32(ArmContext),
    Arm64(Arm64Context),
}

/// Where to find each CPU's `CONTEXT` physical address: walked from
/// `KiProcessorBlock` (the common path), or read directly from a fixed array
/// when the device-specific-info trailer says the addresses are already known
/// (§4.M "alternate path").
pub enum ContextPaSource<'a> {
    Prcb { kd_block: &'a KdDebuggerDataBlock },
    KnownPas { dump_header_pa: Address, kdbg_size: u64 },
}

fn read_word(vreader: &mut VirtualReader, va: Address, word_size: u32) -> Result<u64> {
    if word_size == 8 {
        let mut buf = [0u8; 8];
        vreader.read_page_local(va, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    } else {
        let mut buf = [0u8; 4];
        vreader.read_page_local(va, &mut buf)?;
        Ok(u64::from(u32::from_le_bytes(buf)))
    }
}

struct ResolvedContext {
    cpu_index: usize,
    context_pa: Address,
    bytes: Vec<u8>,
}

fn resolve_via_prcb(
    vreader: &mut VirtualReader,
    kd_block: &KdDebuggerDataBlock,
    number_processors: u32,
    word_size: u32,
    arch: Architecture,
) -> Vec<ResolvedContext> {
    let kpb_va = kd_block.ki_processor_block();
    let off = kd_block.offset_prcb_context();
    let size = arch.context_size();

    let mut out = Vec::new();
    for i in 0..number_processors {
        let prcb_va = match read_word(vreader, kpb_va + (i as u64 * word_size as u64), word_size) {
            Ok(v) => Address::from(v),
            Err(e) => {
                e.log_debug(format!("cpu {}: failed to read prcb_va", i));
                continue;
            }
        };
        if prcb_va.is_null() {
            log::info!("context reconstructor: cpu {} has null prcb_va, skipping", i);
            continue;
        }

        let context_va = match read_word(vreader, prcb_va + off, word_size) {
            Ok(v) => Address::from(v),
            Err(e) => {
                e.log_debug(format!("cpu {}: failed to read context_va", i));
                continue;
            }
        };
        if context_va.is_null() {
            log::info!("context reconstructor: cpu {} has null context_va, skipping", i);
            continue;
        }

        let mut bytes = vec![0u8; size];
        let context_pa = match vreader.read(context_va, &mut bytes, crate::types::PAGE_SIZE) {
            Ok(pa) => pa,
            Err(e) => {
                e.log_warn(format!("cpu {}: failed to read context struct", i));
                continue;
            }
        };

        out.push(ResolvedContext {
            cpu_index: i as usize,
            context_pa,
            bytes,
        });
    }
    out
}

fn resolve_via_known_pas(
    preader: &mut PhysicalReader,
    dump_header_pa: Address,
    kdbg_size: u64,
    number_processors: u32,
    arch: Architecture,
) -> Result<Vec<ResolvedContext>> {
    let array_base = dump_header_pa + crate::types::PAGE_SIZE + kdbg_size + 8u64;
    let size = arch.context_size();

    let mut out = Vec::with_capacity(number_processors as usize);
    for i in 0..number_processors {
        let mut pa_buf = [0u8; 8];
        preader.read(array_base + (i as u64 * 8u64), &mut pa_buf)?;
        let context_pa = Address::from(u64::from_le_bytes(pa_buf));
        if context_pa.is_null() {
            continue;
        }
        let mut bytes = vec![0u8; size];
        preader.read(context_pa, &mut bytes)?;
        out.push(ResolvedContext {
            cpu_index: i as usize,
            context_pa,
            bytes,
        });
    }
    Ok(out)
}

fn apply_overlay(arch: Architecture, bytes: &mut [u8], overlay: &Overlay) {
    match (arch, overlay) {
        (Architecture::Arm, Overlay::Arm32(ctx)) => {
            bytes.copy_from_slice(dataview::Pod::as_bytes(ctx));
        }
        (Architecture::Arm64, Overlay::Arm64(ctx)) => {
            bytes.copy_from_slice(dataview::Pod::as_bytes(ctx));
        }
        _ => {
            log::warn!("context reconstructor: overlay architecture mismatch, skipping overlay");
        }
    }
}

/// Runs the full per-CPU resolve/overlay/write-back sequence (§4.M).
/// `overlays` maps cpu_index to the AP_REG-derived overlay to apply, if any.
/// Both context-PA sources read through the same `vreader`'s underlying
/// physical reader, so the caller only ever needs one live reader over the
/// input.
pub fn reconstruct(
    source: ContextPaSource,
    vreader: &mut VirtualReader,
    output: &mut OutputWriter,
    dump_header: &DumpHeaderVariant,
    arch: Architecture,
    overlays: &std::collections::HashMap<usize, Overlay>,
) -> Result<usize> {
    let number_processors = dump_header.number_processors();
    let word_size = dump_header.word_size();

    let resolved = match source {
        ContextPaSource::Prcb { kd_block } => {
            resolve_via_prcb(vreader, kd_block, number_processors, word_size, arch)
        }
        ContextPaSource::KnownPas { dump_header_pa, kdbg_size } => resolve_via_known_pas(
            vreader.physical(),
            dump_header_pa,
            kdbg_size,
            number_processors,
            arch,
        )?,
    };

    if resolved.is_empty() {
        return Err(Error(ErrorOrigin::ContextReconstructor, ErrorKind::NotFound)
            .log_warn("no cpu context could be resolved"));
    }

    let mut written = 0usize;
    for mut r in resolved {
        if let Some(overlay) = overlays.get(&r.cpu_index) {
            apply_overlay(arch, &mut r.bytes, overlay);
        }
        output.write_by_pa(r.context_pa, &r.bytes)?;
        written += 1;
    }

    Ok(written)
}

#[allow(dead_code)]
fn context_as_x86(bytes: &[u8]) -> X86Context {
    *dataview::DataView::from(bytes).get::<X86Context>(0)
}

#[allow(dead_code)]
fn context_as_amd64(bytes: &[u8]) -> Amd64Context {
    *dataview::DataView::from(bytes).get::<Amd64Context>(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::PagingMode;
    use crate::dumpheader::{
        DumpHeader32, PhysicalMemoryDescriptor32, PhysicalMemoryRun32, DUMP_SIGNATURE,
        MAX_PHYSICAL_MEMORY_RUNS, VALID_DUMP32,
    };
    use crate::io::CursorByteSource;
    use crate::kdbg::{KdDebuggerDataBlock, RawKdDebuggerDataBlock, OWNER_TAG};
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

    fn header32() -> DumpHeaderVariant {
        DumpHeaderVariant::Bits32(DumpHeader32 {
            signature: DUMP_SIGNATURE,
            valid_dump: VALID_DUMP32,
            major_version: 15,
            pae_enabled: 0,
            directory_table_base: 0,
            kd_debugger_data_block: 0,
            physical_memory_block: PhysicalMemoryDescriptor32 {
                number_of_runs: 0,
                number_of_pages: 0,
                runs: [PhysicalMemoryRun32 { base_page: 0, page_count: 0 }; MAX_PHYSICAL_MEMORY_RUNS],
            },
            machine_image_type: 0x1c2,
            number_processors: 1,
            bug_check_code: 0,
            bug_check_parameter: [0; 4],
            dump_type: 1,
            required_dump_space_low: 0,
            required_dump_space_high: 0,
            comment: [0u8; 128],
            secondary_data_state: 0,
        })
    }

    #[test]
    fn resolves_single_cpu_via_prcb_chain() {
        let kpb_va = 0x9000u64;
        let prcb_va = 0xA000u64;
        let off = 0x338u64;
        let context_va = 0xB000u64;

        let dtb = 0x1000u64;

        let mut data = vec![0u8; 0x20_000];
        // Identity-map the first 4 MiB via a single ARM large-page PDE so the
        // plain VA offsets written below land at matching physical addresses.
        let pde_addr = dtb + (kpb_va >> 22) * 4;
        data[pde_addr as usize..pde_addr as usize + 4].copy_from_slice(&(0x80u32 | 0x1).to_le_bytes());

        data[kpb_va as usize..kpb_va as usize + 4].copy_from_slice(&(prcb_va as u32).to_le_bytes());
        let ctx_field_addr = (prcb_va + off) as usize;
        data[ctx_field_addr..ctx_field_addr + 4].copy_from_slice(&(context_va as u32).to_le_bytes());

        let region = flat_region(data.len() as u64);
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut preader = PhysicalReader::new(&mut src, &regions);
        let mut vreader = VirtualReader::new(&mut preader, PagingMode::Arm32, Address::from(dtb));

        let kd_block = KdDebuggerDataBlock {
            raw: RawKdDebuggerDataBlock {
                list_next: 0,
                list_blink: 0,
                owner_tag: OWNER_TAG,
                size: crate::kdbg::KDBG_SIZE_CURRENT,
                ki_processor_block: kpb_va,
                offset_prcb_context: off,
                ki_bugcheck_data: 0,
            },
            resolved_pa: Address::NULL,
        };

        let resolved = resolve_via_prcb(&mut vreader, &kd_block, 1, 4, Architecture::Arm);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].context_pa.as_u64(), context_va);
    }

    #[test]
    fn reconstruct_errors_when_nothing_resolves() {
        let data = vec![0u8; 0x1000];
        let region = flat_region(data.len() as u64);
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut preader = PhysicalReader::new(&mut src, &regions);
        let mut vreader = VirtualReader::new(&mut preader, PagingMode::Arm32, Address::NULL);

        let kd_block = KdDebuggerDataBlock {
            raw: RawKdDebuggerDataBlock {
                list_next: 0,
                list_blink: 0,
                owner_tag: OWNER_TAG,
                size: crate::kdbg::KDBG_SIZE_CURRENT,
                ki_processor_block: 0,
                offset_prcb_context: 0,
                ki_bugcheck_data: 0,
            },
            resolved_pa: Address::NULL,
        };

        let header = header32();
        let mut out_src = CursorByteSource::new(vec![0u8; 0x1000]);
        let runs = vec![OutputRun { base: Address::NULL, end: Address::from(0xFFFu64) }];
        let mut output = OutputWriter::new(&mut out_src, &runs, 0);
        let overlays = std::collections::HashMap::new();

        let err = reconstruct(
            ContextPaSource::Prcb { kd_block: &kd_block },
            &mut vreader,
            &mut output,
            &header,
            Architecture::Arm,
            &overlays,
        );
        assert!(err.is_err());
    }
}
