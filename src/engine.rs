/*!
The single entry point gluing every component into the end-to-end conversion:
Container -> MemoryMap -> DumpHeaderLocator -> MemoryBlockValidator ->
CompleteMap -> DumpWriter -> KdDebuggerDataBlock -> ContextReconstructor ->
SecondaryDataWriter, in that order, per the system overview's control-flow
line. Grounded on `original_source/raw2dump/src/raw2dump.cpp`'s
`ConvertRawToDump`, which drives the same sequence over a single
`DMP_CONTEXT`; here that role is played by local state threaded through one
function instead of a heap-allocated context struct passed by pointer.
*/

use std::collections::HashMap;

use crate::apreg;
use crate::completemap::{self, CompleteMemoryRegion};
use crate::config::RunConfig;
use crate::container::{self, SectionHeader, SectionType};
use crate::context::{self, ContextPaSource, Overlay};
use crate::cpu_context::Architecture;
use crate::device_info::{self, DeviceSpecificInfo};
use crate::dumpheader::{self, DumpHeaderStatus, DumpHeaderVariant};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::kdbg;
use crate::memblock;
use crate::memmap::{self, DdrRegion};
use crate::physical_reader::{OutputRun, OutputWriter, PhysicalReader};
use crate::secondary;
use crate::types::Address;
use crate::virt::VirtualReader;

/// Parameter2 of the best-effort bugcheck, matching §7's table: distinguishes
/// "no sv info at all" from a located-but-rejected/absent header.
const BEST_EFFORT_PARAM1: u32 = 0xFFFF;
const BEST_EFFORT_PARAM2_NO_SV_INFO: u32 = 0;
const BEST_EFFORT_PARAM2_NOT_FOUND_OR_INVALID: u32 = 1;

/// Summarizes one run of [`convert`] for the caller (§2.1-P "ambient stack").
#[derive(Debug)]
pub struct RunReport {
    pub status: DumpHeaderStatus,
    pub actual_dump_size: u64,
    pub contexts_written: usize,
    pub secondary_bytes_written: u64,
}

fn ddr_sections(parsed: &container::ParsedContainer) -> Vec<(usize, &SectionHeader)> {
    parsed
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind() == Some(SectionType::DdrRange))
        .collect()
}

fn sv_sections(parsed: &container::ParsedContainer) -> Vec<(usize, &SectionHeader)> {
    parsed
        .sections
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind() == Some(SectionType::SvSpecific))
        .collect()
}

fn output_runs(validated: &[memblock::ValidatedRun]) -> Vec<OutputRun> {
    validated
        .iter()
        .map(|r| OutputRun { base: r.base, end: r.end })
        .collect()
}

fn architecture_of(
    device_info: Option<&DeviceSpecificInfo>,
    header: &DumpHeaderVariant,
) -> Option<Architecture> {
    device_info
        .and_then(|d| d.processor_arch.to_architecture())
        .or_else(|| Architecture::from_machine_image_type(header.machine_image_type()))
}

/// Writes just the patched header with no payload, for the §7 best-effort
/// path: the dump header could not be located (or failed validation), so the
/// best this run can do is hand back a header stamped with a recognizable
/// bugcheck and an empty physical memory block.
fn write_best_effort_header(
    output: &mut dyn ByteSource,
    param2: u32,
    in_mem_data_va: Address,
) -> Result<RunReport> {
    let mut header = DumpHeaderVariant::Bits64(crate::dumpheader::DumpHeader64 {
        signature: crate::dumpheader::DUMP_SIGNATURE,
        valid_dump: crate::dumpheader::VALID_DUMP64,
        major_version: 15,
        pae_enabled: 0,
        directory_table_base: 0,
        kd_debugger_data_block: 0,
        physical_memory_block: crate::dumpheader::PhysicalMemoryDescriptor64 {
            number_of_runs: 0,
            number_of_pages: 0,
            runs: [crate::dumpheader::PhysicalMemoryRun64 { base_page: 0, page_count: 0 };
                crate::dumpheader::MAX_PHYSICAL_MEMORY_RUNS],
        },
        machine_image_type: 0,
        number_processors: 0,
        bug_check_code: crate::dumpheader::FATAL_ABNORMAL_RESET_ERROR,
        bug_check_parameter: [0; 4],
        dump_type: crate::dumpheader::DUMP_TYPE_FULL,
        required_dump_space: 0,
        comment: [0u8; 128],
        secondary_data_state: 0,
    });

    let packed_param3 = 0u32;
    header.set_bug_check(
        crate::dumpheader::FATAL_ABNORMAL_RESET_ERROR,
        BEST_EFFORT_PARAM1,
        param2,
        packed_param3,
        in_mem_data_va.as_u64() as u32,
    );
    header.set_required_dump_space(header.header_size());

    let header_bytes = header.to_bytes();
    output.write_at(0, &header_bytes)?;
    output.flush()?;

    let status = if param2 == BEST_EFFORT_PARAM2_NO_SV_INFO {
        DumpHeaderStatus::NoSvInfo
    } else {
        DumpHeaderStatus::NotFound
    };

    Ok(RunReport {
        status,
        actual_dump_size: header.header_size(),
        contexts_written: 0,
        secondary_bytes_written: 0,
    })
}

/// Runs the full raw-dump-to-minidump conversion against an already-parsed
/// container and located dump header. Broken out from [`convert`] so the
/// happy path and the already-committed-to-best-effort path share nothing but
/// the caller's decision of which one to take.
fn convert_with_header(
    located: dumpheader::LocatedHeader,
    parsed: &container::ParsedContainer,
    regions: &[DdrRegion],
    input: &mut dyn ByteSource,
    output: &mut dyn ByteSource,
    device_info: Option<DeviceSpecificInfo>,
    config: &RunConfig,
) -> Result<RunReport> {
    let dumpheader::LocatedHeader {
        mut header,
        dump_header_pa,
        status: _,
    } = located;

    let validated_runs = memblock::validate(regions, &header.runs())?;
    let complete_map = completemap::build(regions, &validated_runs, config)?;

    let arch = architecture_of(device_info.as_ref(), &header).ok_or_else(|| {
        Error(ErrorOrigin::ContextReconstructor, ErrorKind::Unknown)
            .log_error("could not determine target architecture")
    })?;

    let write_state = {
        let mut preader_for_write = PhysicalReader::new(input, regions);
        crate::writer::write(
            output,
            &mut header,
            &validated_runs,
            &mut preader_for_write,
            (header.bug_check_code(), 0, 0, 0, 0),
            config.write_secondary_data && !sv_sections(parsed).is_empty(),
        )?
    };

    let runs = output_runs(&validated_runs);
    let mut outwriter = OutputWriter::new(output, &runs, write_state.ddr_file_offset);

    let kd_block_va = header.kd_debugger_data_block();
    let kd_block = {
        let mut preader2 = PhysicalReader::new(input, regions);
        let mut vreader = VirtualReader::new(&mut preader2, header.paging_mode(), header.directory_table_base());
        kdbg::locate(&mut vreader, kd_block_va, dump_header_pa)
    };

    let mut contexts_written = 0usize;
    let mut legacy_cpu_context_bytes: Option<Vec<u8>> = None;

    if let Ok(kd_block) = kd_block.as_ref() {
        kdbg::patch_bugcheck_and_writeback(
            kd_block,
            &mut {
                let mut p = PhysicalReader::new(input, regions);
                VirtualReader::new(&mut p, header.paging_mode(), header.directory_table_base())
            },
            &mut outwriter,
            (header.bug_check_code(), 0, 0, 0, 0),
        )
        .ok();

        let overlays = resolve_overlays(input, regions, device_info.as_ref(), arch, &mut legacy_cpu_context_bytes);

        let mut preader3 = PhysicalReader::new(input, regions);
        let mut vreader = VirtualReader::new(&mut preader3, header.paging_mode(), header.directory_table_base());
        let source = ContextPaSource::Prcb { kd_block };
        match context::reconstruct(source, &mut vreader, &mut outwriter, &header, arch, &overlays) {
            Ok(n) => contexts_written = n,
            Err(e) => {
                e.log_warn("prcb-based context reconstruction failed, trying known-pa fallback");
                if let Some(info) = device_info.as_ref() {
                    if !info.cpu_context_address.is_null() {
                        let source = ContextPaSource::KnownPas {
                            dump_header_pa,
                            kdbg_size: std::mem::size_of::<kdbg::RawKdDebuggerDataBlock>() as u64,
                        };
                        let mut preader4 = PhysicalReader::new(input, regions);
                        let mut vreader2 =
                            VirtualReader::new(&mut preader4, header.paging_mode(), header.directory_table_base());
                        if let Ok(n) =
                            context::reconstruct(source, &mut vreader2, &mut outwriter, &header, arch, &overlays)
                        {
                            contexts_written = n;
                        }
                    }
                }
            }
        }
    } else {
        kd_block
            .as_ref()
            .err()
            .map(|e| e.log_warn("kd debugger data block not found, cpu contexts will be absent"));
    }

    let mut secondary_bytes_written = 0u64;
    if config.write_secondary_data {
        let table_size = std::mem::size_of::<container::RawDumpHeader>()
            + parsed.sections.len() * std::mem::size_of::<SectionHeader>();
        let mut raw_table_bytes = vec![0u8; table_size];
        input.read_at(0, &mut raw_table_bytes)?;

        let sv = sv_sections(parsed);
        secondary_bytes_written = secondary::write(
            output,
            write_state.secondary_data_offset,
            &raw_table_bytes,
            legacy_cpu_context_bytes.as_deref(),
            &sv,
            input,
            regions,
            &complete_map,
        )?;
    }

    Ok(RunReport {
        status: DumpHeaderStatus::Valid,
        actual_dump_size: write_state.actual_dump_size,
        contexts_written,
        secondary_bytes_written,
    })
}

fn resolve_overlays(
    input: &mut dyn ByteSource,
    regions: &[DdrRegion],
    device_info: Option<&DeviceSpecificInfo>,
    arch: Architecture,
    legacy_cpu_context_out: &mut Option<Vec<u8>>,
) -> HashMap<usize, Overlay> {
    let mut overlays = HashMap::new();
    let Some(info) = device_info else {
        return overlays;
    };
    if info.ap_reg_pa.is_null() {
        return overlays;
    }

    let mut preader = PhysicalReader::new(input, regions);

    if arch.is_arm() && arch == Architecture::Arm {
        if let Ok(header) = apreg::read_legacy_header(&mut preader, info.ap_reg_pa) {
            if let Ok(raw) = apreg::read_legacy_raw(&mut preader, info.ap_reg_pa, header.cpu_count) {
                *legacy_cpu_context_out = Some(raw);
            }
            if let Ok(legacy) = apreg::parse_legacy(&mut preader, info.ap_reg_pa) {
                for overlay in legacy {
                    overlays.insert(overlay.cpu_index, Overlay::Arm32(overlay.context));
                }
                return overlays;
            }
        }
    }

    if let Ok(modern) = apreg::parse_modern_tree(&mut preader, info.ap_reg_pa) {
        for overlay in modern {
            match overlay {
                apreg::ModernOverlay::Arm32 { cpu_index, context } => {
                    overlays.insert(cpu_index, Overlay::Arm32(context));
                }
                apreg::ModernOverlay::Arm64 { cpu_index, context } => {
                    overlays.insert(cpu_index, Overlay::Arm64(context));
                }
            }
        }
    }

    overlays
}

/// The core's only public entry point: converts the raw DRAM panic snapshot
/// read through `input` into a Windows-style kernel minidump written through
/// `output`. `device_info` is the decoded trailer when the caller has already
/// read one (or parsed an external metadata file into the same shape);
/// `None` makes this call attempt [`device_info::read`] against `input`
/// itself, and tolerates its absence.
pub fn convert(
    input: &mut dyn ByteSource,
    output: &mut dyn ByteSource,
    device_info: Option<DeviceSpecificInfo>,
    config: &RunConfig,
) -> Result<RunReport> {
    let parsed = container::parse(input)?;
    let ddr = ddr_sections(&parsed);
    let regions = memmap::build(&ddr)?;

    let device_info = device_info.or_else(|| device_info::read(input).ok());

    let expected_instance_id = device_info
        .as_ref()
        .map(|d| d.dump_header_instance_id)
        .or(config.expected_instance_id);

    let located = {
        let mut reader = PhysicalReader::new(input, &regions);
        dumpheader::locate(&mut reader, &regions, expected_instance_id)
    };

    match located {
        Ok(located) => {
            convert_with_header(located, &parsed, &regions, input, output, device_info, config)
        }
        Err(e) => {
            e.log_warn("dump header locator failed, falling back to a best-effort header");
            let param2 = if device_info.is_none() {
                BEST_EFFORT_PARAM2_NO_SV_INFO
            } else {
                BEST_EFFORT_PARAM2_NOT_FOUND_OR_INVALID
            };
            let in_mem_data_va = device_info.as_ref().map(|d| d.in_mem_data_va).unwrap_or(Address::NULL);
            write_best_effort_header(output, param2, in_mem_data_va)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DumpFlags, RAW_DUMP_SECTION_HEADER_VERSION};
    use crate::dumpheader::{
        DumpHeader32, PhysicalMemoryDescriptor32, PhysicalMemoryRun32, DUMP_SIGNATURE,
        MAX_PHYSICAL_MEMORY_RUNS, VALID_DUMP32,
    };
    use crate::io::CursorByteSource;
    use crate::types::Guid;

    fn raw_dump_header(sections_count: u32, dump_size: u64) -> container::RawDumpHeader {
        container::RawDumpHeader {
            signature: container::RAW_DUMP_SIGNATURE,
            version: 1,
            flags: DumpFlags::VALID.bits(),
            dump_size,
            total_dump_size_required: dump_size,
            sections_count,
            os_data: 0,
            cpu_context: 0,
            reset_trigger: 0,
        }
    }

    fn build_container_bytes(ddr_payload: Vec<u8>) -> Vec<u8> {
        let ddr_offset = (std::mem::size_of::<container::RawDumpHeader>()
            + std::mem::size_of::<SectionHeader>()) as u64;
        let section = SectionHeader::new(
            DumpFlags::VALID,
            RAW_DUMP_SECTION_HEADER_VERSION,
            SectionType::DdrRange,
            ddr_offset,
            ddr_payload.len() as u64,
            "DDR0",
            0x0,
            Guid::NULL,
        );
        let header = raw_dump_header(1, ddr_offset + ddr_payload.len() as u64);

        let mut buf = dataview::Pod::as_bytes(&header).to_vec();
        buf.extend_from_slice(dataview::Pod::as_bytes(&section));
        buf.extend_from_slice(&ddr_payload);
        buf
    }

    fn embed_dump_header(ddr: &mut [u8], at: usize, instance_id: u64) {
        let mut header = DumpHeader32 {
            signature: DUMP_SIGNATURE,
            valid_dump: VALID_DUMP32,
            major_version: 15,
            pae_enabled: 0,
            directory_table_base: 0,
            kd_debugger_data_block: 0,
            physical_memory_block: PhysicalMemoryDescriptor32 {
                number_of_runs: 1,
                number_of_pages: 1,
                runs: {
                    let mut runs =
                        [PhysicalMemoryRun32 { base_page: 0, page_count: 0 }; MAX_PHYSICAL_MEMORY_RUNS];
                    runs[0] = PhysicalMemoryRun32 { base_page: 0, page_count: 1 };
                    runs
                },
            },
            machine_image_type: crate::cpu_context::IMAGE_FILE_MACHINE_ARM,
            number_processors: 0,
            bug_check_code: crate::dumpheader::FATAL_ABNORMAL_RESET_ERROR,
            bug_check_parameter: [0; 4],
            dump_type: crate::dumpheader::DUMP_TYPE_FULL,
            required_dump_space_low: u32::from_le_bytes(crate::dumpheader::DUMP_SIGNATURE),
            required_dump_space_high: 0,
            comment: [0u8; 128],
            secondary_data_state: 0,
        };
        header.comment[0..8].copy_from_slice(&instance_id.to_le_bytes());

        ddr[at..at + crate::dumpheader::MAGIC.len()].copy_from_slice(&crate::dumpheader::MAGIC);
        let header_off = at + crate::dumpheader::MAGIC.len();
        let bytes = dataview::Pod::as_bytes(&header);
        ddr[header_off..header_off + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn converts_happy_path_32_bit_arm() {
        let mut ddr_payload = vec![0u8; 0x20_0000];
        embed_dump_header(&mut ddr_payload, 0x1000, 0xDEAD_BEEF_0000_0001);
        let bytes = build_container_bytes(ddr_payload);

        let mut input = CursorByteSource::new(bytes);
        let mut output = CursorByteSource::new(vec![]);
        let config = RunConfig {
            expected_instance_id: Some(0xDEAD_BEEF_0000_0001),
            write_secondary_data: false,
            ..RunConfig::default()
        };

        let report = convert(&mut input, &mut output, None, &config).unwrap();
        assert_eq!(report.status, DumpHeaderStatus::Valid);
        assert!(report.actual_dump_size > 0);
    }

    #[test]
    fn falls_back_to_best_effort_header_when_no_dump_header_present() {
        let ddr_payload = vec![0u8; 0x1000];
        let bytes = build_container_bytes(ddr_payload);

        let mut input = CursorByteSource::new(bytes);
        let mut output = CursorByteSource::new(vec![]);
        let config = RunConfig::default();

        let report = convert(&mut input, &mut output, None, &config).unwrap();
        assert_eq!(report.status, DumpHeaderStatus::NoSvInfo);
        let out_bytes = output.into_inner();
        assert_eq!(&out_bytes[0..4], &DUMP_SIGNATURE);
    }
}
