/*!
AP_REG parsing and overlay (§4.M "AP_REG overlay"): the vendor-specific
register-capture blob that independently records each CPU's state at panic
time, in two on-disk shapes recovered from `original_source`:

- the legacy flat format (`original_source/raw2dump/src/apreg.cpp`,
  `common.h`'s `SECURE_CPU_CONTEXT`/`NON_SECURE_CPU_CONTEXT`/`CPU_STATUS`), and
- the modern typed-entry tree (`original_source/raw2dump/src/apreg64.{h,cpp}`).

Both ultimately produce an [`ArmContext`]/[`Arm64Context`] overlay that
[`crate::context`] merges into the CPU's OS-saved `CONTEXT` before writing it
back to the output.
*/

use dataview::Pod;

use crate::cpu_context::{Arm64Context, ArmContext};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::physical_reader::PhysicalReader;
use crate::types::Address;

// ---------------------------------------------------------------------
// Legacy flat format
// ---------------------------------------------------------------------

pub const AP_REG_STRUCTURE_MAGIC_VALUE: u32 = 0x4443_4151;
pub const AP_REG_STRUCTURE_V2: u32 = 2;
pub const AP_REG_STRUCTURE_V3: u32 = 3;
pub const AP_REG_STRUCTURE_V4: u32 = 4;
pub const AP_REG_MAX_CPUS: u32 = 4;

bitflags::bitflags! {
    /// `_CPU_STATUS`'s bitfield, named per the commented-out layout in
    /// `original_source/raw2dump/src/common.h`.
    #[derive(Default)]
    pub struct CpuStatus: u32 {
        const NS = 0x01;
        const WDT = 0x02;
        const SGI = 0x04;
        const WARM_BOOT = 0x08;
        const DBI_RSVD = 0x10;
        const CPU_CONTEXT = 0x20;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct ApRegHeader {
    pub magic: u32,
    pub version: u32,
    pub cpu_count: u32,
}

/// `tzbsp_mon_cpu_ctx_t`: the banked ARM register set captured at panic time.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct SecureCpuContext {
    pub mon_lr: u32,
    pub mon_spsr: u32,
    pub usr_r: [u32; 13],
    pub usr_r13: u32,
    pub usr_r14: u32,
    pub irq_spsr: u32,
    pub irq_r13: u32,
    pub irq_r14: u32,
    pub svc_spsr: u32,
    pub svc_r13: u32,
    pub svc_r14: u32,
    pub abt_spsr: u32,
    pub abt_r13: u32,
    pub abt_r14: u32,
    pub und_spsr: u32,
    pub und_r13: u32,
    pub und_r14: u32,
    pub fiq_spsr: u32,
    pub fiq_r8: u32,
    pub fiq_r9: u32,
    pub fiq_r10: u32,
    pub fiq_r11: u32,
    pub fiq_r12: u32,
    pub fiq_r13: u32,
    pub fiq_r14: u32,
}

/// `tzbsp_cpu_ctx_t`.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
pub struct NonSecureCpuContext {
    pub saved_ctx: SecureCpuContext,
    pub mon_sp: u32,
    pub wdog_pc: u32,
}

const ARM_MODE_FIQ: u32 = 0x11;
const ARM_MODE_IRQ: u32 = 0x12;
const ARM_MODE_SVC: u32 = 0x13;
const ARM_MODE_ABT: u32 = 0x17;
const ARM_MODE_UND: u32 = 0x1B;

/// Maps a `SECURE_CPU_CONTEXT` snapshot into an [`ArmContext`] overlay,
/// selecting the banked `sp`/`lr` by the saved mode bits (`mon_spsr & 0x1F`)
/// per §4.M.
pub fn overlay_from_secure_context(ctx: &SecureCpuContext) -> ArmContext {
    let mode = ctx.mon_spsr & 0x1F;
    let (sp, lr) = match mode {
        ARM_MODE_FIQ => (ctx.fiq_r13, ctx.fiq_r14),
        ARM_MODE_IRQ => (ctx.irq_r13, ctx.irq_r14),
        ARM_MODE_SVC => (ctx.svc_r13, ctx.svc_r14),
        ARM_MODE_ABT => (ctx.abt_r13, ctx.abt_r14),
        ARM_MODE_UND => (ctx.und_r13, ctx.und_r14),
        _ => (ctx.usr_r13, ctx.usr_r14),
    };

    let mut r = ctx.usr_r;
    if mode == ARM_MODE_FIQ {
        r[8] = ctx.fiq_r8;
        r[9] = ctx.fiq_r9;
        r[10] = ctx.fiq_r10;
        r[11] = ctx.fiq_r11;
        r[12] = ctx.fiq_r12;
    }

    ArmContext {
        context_flags: 0,
        r,
        sp,
        lr,
        pc: ctx.mon_lr,
        cpsr: ctx.mon_spsr,
        fpscr: 0,
        padding: 0,
        float_and_debug: [0u8; 0x110],
    }
}

/// Per-CPU "should this overlay be trusted" predicate, grounded on
/// `original_source/raw2dump/src/apreg.cpp`'s literal condition (§4.M ADDED
/// detail): skip when the CPU warm-booted via SGI, or flagged DBI-reserved, or
/// captured none of NS/WDT/SGI/WarmBoot (an empty/garbage snapshot). Version 4
/// narrows this further to "only trust it if DBI_RSVD or CPU_CONTEXT is set".
pub fn should_skip_overlay(status: CpuStatus, version: u32) -> bool {
    let base_skip = (status & (CpuStatus::WARM_BOOT | CpuStatus::SGI))
        == (CpuStatus::WARM_BOOT | CpuStatus::SGI)
        || status.contains(CpuStatus::DBI_RSVD)
        || (status & (CpuStatus::NS | CpuStatus::WDT | CpuStatus::SGI | CpuStatus::WARM_BOOT))
            .is_empty();

    if base_skip {
        return true;
    }
    if version == AP_REG_STRUCTURE_V4 {
        return !(status.contains(CpuStatus::DBI_RSVD) || status.contains(CpuStatus::CPU_CONTEXT));
    }
    false
}

pub struct LegacyOverlay {
    pub cpu_index: usize,
    pub context: ArmContext,
}

/// Total size of the legacy AP_REG blob this crate actually reads (header +
/// status array + context array, see [`parse_legacy`]'s doc comment on why the
/// original tool's larger `dataSize` allocation is not reproduced here).
pub fn legacy_blob_size(cpu_count: u32) -> u64 {
    std::mem::size_of::<ApRegHeader>() as u64
        + cpu_count as u64 * 4
        + cpu_count as u64 * std::mem::size_of::<NonSecureCpuContext>() as u64
}

/// Reads the legacy AP_REG blob's header alone, for callers that need
/// `cpu_count` before deciding whether to also capture the raw bytes for the
/// `CpuContext` secondary-data blob (§4.K, blob 2).
pub fn read_legacy_header(reader: &mut PhysicalReader, pa: Address) -> Result<ApRegHeader> {
    let mut header_bytes = [0u8; std::mem::size_of::<ApRegHeader>()];
    reader.read(pa, &mut header_bytes)?;
    let header = *dataview::DataView::from(&header_bytes[..]).get::<ApRegHeader>(0);
    if header.magic != AP_REG_STRUCTURE_MAGIC_VALUE {
        return Err(
            Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg).log_warn("bad ap_reg magic")
        );
    }
    Ok(header)
}

/// Reads the raw bytes of the legacy AP_REG blob verbatim, for the
/// `CpuContext` secondary-data blob.
pub fn read_legacy_raw(reader: &mut PhysicalReader, pa: Address, cpu_count: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; legacy_blob_size(cpu_count) as usize];
    reader.read(pa, &mut buf)?;
    Ok(buf)
}

/// Parses the legacy flat AP_REG blob at `pa` and returns the overlays to
/// apply, skipping any CPU whose status fails [`should_skip_overlay`].
/// Layout: header, `cpu_count` × [`CpuStatus`], `cpu_count` ×
/// [`NonSecureCpuContext`] (§3, corrected against `original_source`'s actual
/// indexing rather than its `dataSize` allocation, which over-provisions by a
/// trailing `SecureCpuContext` and a watchdog-status array neither read path
/// ever indexes into).
pub fn parse_legacy(reader: &mut PhysicalReader, pa: Address) -> Result<Vec<LegacyOverlay>> {
    let mut header_bytes = [0u8; std::mem::size_of::<ApRegHeader>()];
    reader.read(pa, &mut header_bytes)?;
    let header = *dataview::DataView::from(&header_bytes[..]).get::<ApRegHeader>(0);

    if header.magic != AP_REG_STRUCTURE_MAGIC_VALUE {
        return Err(
            Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg).log_warn("bad ap_reg magic")
        );
    }
    if !matches!(
        header.version,
        AP_REG_STRUCTURE_V2 | AP_REG_STRUCTURE_V3 | AP_REG_STRUCTURE_V4
    ) {
        return Err(Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg)
            .log_warn(format!("unrecognized ap_reg version {}", header.version)));
    }
    if header.cpu_count > AP_REG_MAX_CPUS {
        return Err(Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg)
            .log_warn(format!("cpu_count {} exceeds max", header.cpu_count)));
    }

    // On-disk layout per `UpdateContextWithAPRegLegacy` in
    // `original_source/raw2dump/src/apreg.cpp`: header, then a flat array of
    // `cpu_count` CPU_STATUS words, then a flat array of `cpu_count`
    // NON_SECURE_CPU_CONTEXT records. Each CPU's status word and its context
    // record share the same index; the context record's leading
    // `SECURE_CPU_CONTEXT` bytes (its `saved_ctx` field) are what
    // `TZBSPContextToNTContext` actually reads.
    let status_array_pa = pa + std::mem::size_of::<ApRegHeader>() as u64;
    let mut statuses = Vec::with_capacity(header.cpu_count as usize);
    for i in 0..header.cpu_count {
        let mut buf = [0u8; 4];
        reader.read(status_array_pa + (i as u64 * 4), &mut buf)?;
        statuses.push(CpuStatus::from_bits_truncate(u32::from_le_bytes(buf)));
    }

    let nsc_size = std::mem::size_of::<NonSecureCpuContext>() as u64;
    let context_array_pa = status_array_pa + (header.cpu_count as u64 * 4);

    let mut overlays = Vec::new();
    for (i, status) in statuses.iter().enumerate() {
        if should_skip_overlay(*status, header.version) {
            log::info!("ap_reg: skipping overlay for cpu {}", i);
            continue;
        }

        let mut buf = vec![0u8; nsc_size as usize];
        reader.read(context_array_pa + (i as u64 * nsc_size), &mut buf)?;
        let nsc = *dataview::DataView::from(&buf[..]).get::<NonSecureCpuContext>(0);

        overlays.push(LegacyOverlay {
            cpu_index: i,
            context: overlay_from_secure_context(&nsc.saved_ctx),
        });
    }

    Ok(overlays)
}

// ---------------------------------------------------------------------
// Modern typed-entry tree format
// ---------------------------------------------------------------------

pub const MSM_DUMP_TYPE_DATA: u32 = 0x00;
pub const MSM_DUMP_TYPE_TABLE: u32 = 0x01;
pub const MSM_DUMP_DATA_CPU_CTX: u32 = 0x0;

pub const AP_REG_TABLE_VERSION_ARM: u32 = 0x01;
pub const AP_REG_TABLE_VERSION_ARM64: u32 = 0x0020_0000;

const DATA_MAGIC: u32 = u32::from_le_bytes(*b"SYDB");

#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct RawTableHeader {
    version: u32,
    num_entries: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct RawEntry {
    id: u32,
    name: [u8; 32],
    entry_type: u32,
    address: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct RawDumpData {
    version: u32,
    magic: u32,
    name: [u8; 32],
    address: u64,
    len: u64,
    _reserved: u64,
}

/// `SDI_CPU32_CTXT_REGS_TYPE`: 32-bit AP_REG per-CPU register capture,
/// oddly stored as 64-bit words regardless of the nominal register width
/// (a quirk of the original on-disk format, preserved here, §3).
#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct Cpu32Regs {
    r: [u64; 13],
    r13_usr: u64,
    r14_usr: u64,
    r13_hyp: u64,
    r14_irq: u64,
    r13_irq: u64,
    r14_svc: u64,
    r13_svc: u64,
    r14_abt: u64,
    r13_abt: u64,
    r14_und: u64,
    r13_und: u64,
    r8_fiq: u64,
    r9_fiq: u64,
    r10_fiq: u64,
    r11_fiq: u64,
    r12_fiq: u64,
    r13_fiq: u64,
    r14_fiq: u64,
    pc: u64,
    cpsr: u64,
    r13_mon: u64,
    r14_mon: u64,
    r14_hyp: u64,
    _reserved: [u64; 5],
}

/// `SDI_CPU64_CTXT_REGS_TYPE`.
#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct Cpu64Regs {
    x: [u64; 31],
    pc: u64,
    current_el: u64,
    sp_el3: u64,
    elr_el3: u64,
    spsr_el3: u64,
    sp_el2: u64,
    elr_el2: u64,
    spsr_el2: u64,
    sp_el1: u64,
    elr_el1: u64,
    spsr_el1: u64,
    sp_el0: u64,
    _reserved: [u64; 4],
}

const NUM_CPU_STATUS_ENTRIES: usize = 4;
/// `SDICPUCtxtType`'s layout: status words, then the register union (sized to
/// the larger of the two arms), then a matching reserved union.
const CPU_REGS_UNION_SIZE: usize = std::mem::size_of::<Cpu64Regs>();
const CPU_CTXT_SIZE: u64 =
    (NUM_CPU_STATUS_ENTRIES * 4 + 2 * CPU_REGS_UNION_SIZE) as u64;

pub enum ModernOverlay {
    Arm32 { cpu_index: usize, context: ArmContext },
    Arm64 { cpu_index: usize, context: Arm64Context },
}

/// Synthesizes an [`ArmContext`] from the raw 32-bit AP_REG register capture.
/// Banked register selection follows the same `cpsr & 0x1F` rule as the
/// legacy-format overlay (§4.M).
fn arm_context_from_regs(regs: &Cpu32Regs) -> ArmContext {
    let mode = (regs.cpsr as u32) & 0x1F;
    let (sp, lr) = match mode {
        ARM_MODE_FIQ => (regs.r13_fiq, regs.r14_fiq),
        ARM_MODE_IRQ => (regs.r13_irq, regs.r14_irq),
        ARM_MODE_SVC => (regs.r13_svc, regs.r14_svc),
        ARM_MODE_ABT => (regs.r13_abt, regs.r14_abt),
        ARM_MODE_UND => (regs.r13_und, regs.r14_und),
        _ => (regs.r13_usr, regs.r14_usr),
    };

    let mut r = [0u32; 13];
    for i in 0..13 {
        r[i] = regs.r[i] as u32;
    }
    if mode == ARM_MODE_FIQ {
        r[8] = regs.r8_fiq as u32;
        r[9] = regs.r9_fiq as u32;
        r[10] = regs.r10_fiq as u32;
        r[11] = regs.r11_fiq as u32;
        r[12] = regs.r12_fiq as u32;
    }

    ArmContext {
        context_flags: 0,
        r,
        sp: sp as u32,
        lr: lr as u32,
        pc: regs.pc as u32,
        cpsr: regs.cpsr as u32,
        fpscr: 0,
        padding: 0,
        float_and_debug: [0u8; 0x110],
    }
}

fn arm64_context_from_regs(regs: &Cpu64Regs) -> Arm64Context {
    let mut x = [0u64; 29];
    x.copy_from_slice(&regs.x[0..29]);
    Arm64Context {
        context_flags: 0,
        cpsr: (regs.spsr_el3 & 0xFFFF_FFFF) as u32,
        x,
        fp: regs.x[29],
        lr: regs.x[30],
        sp: regs.sp_el3,
        pc: regs.elr_el3,
        float_and_debug: [0u8; 0x80],
    }
}

/// Recursively-shaped but iteratively walked: a bounded work-list over the
/// `ApRegDumpTable` tree (§9 design notes), guarding against cycles with a
/// visited-address set rather than unbounded recursion.
pub fn parse_modern_tree(
    reader: &mut PhysicalReader,
    root_pa: Address,
) -> Result<Vec<ModernOverlay>> {
    let mut header_bytes = [0u8; std::mem::size_of::<RawTableHeader>()];
    reader.read(root_pa, &mut header_bytes)?;
    let root_header = *dataview::DataView::from(&header_bytes[..]).get::<RawTableHeader>(0);

    if root_header.version != AP_REG_TABLE_VERSION_ARM
        && root_header.version != AP_REG_TABLE_VERSION_ARM64
    {
        return Err(Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg)
            .log_warn(format!("unrecognized ap_reg table version {:#x}", root_header.version)));
    }
    let is_arm64 = root_header.version == AP_REG_TABLE_VERSION_ARM64;

    let mut work_list = vec![(root_pa, root_header.num_entries as usize)];
    let mut visited = std::collections::HashSet::new();
    let mut total_budget: usize = root_header.num_entries as usize + 1;
    let mut overlays = Vec::new();
    let mut cpu_index = 0usize;

    while let Some((table_pa, num_entries)) = work_list.pop() {
        if !visited.insert(table_pa.as_u64()) {
            continue;
        }

        let entries_base = table_pa + std::mem::size_of::<RawTableHeader>() as u64;
        let entry_size = std::mem::size_of::<RawEntry>() as u64;

        for i in 0..num_entries {
            if total_budget == 0 {
                return Err(Error(ErrorOrigin::ContextReconstructor, ErrorKind::NoAPReg)
                    .log_warn("ap_reg tree exceeded its entry-count budget"));
            }
            total_budget -= 1;

            let entry_pa = entries_base + i as u64 * entry_size;
            let mut entry_bytes = [0u8; std::mem::size_of::<RawEntry>()];
            reader.read(entry_pa, &mut entry_bytes)?;
            let entry = *dataview::DataView::from(&entry_bytes[..]).get::<RawEntry>(0);

            if entry.entry_type == MSM_DUMP_TYPE_TABLE {
                if entry.address == 0 || visited.contains(&entry.address) {
                    continue;
                }
                let mut sub_header = [0u8; std::mem::size_of::<RawTableHeader>()];
                if reader.read(Address::from(entry.address), &mut sub_header).is_err() {
                    continue;
                }
                let sub = *dataview::DataView::from(&sub_header[..]).get::<RawTableHeader>(0);
                work_list.push((Address::from(entry.address), sub.num_entries as usize));
                continue;
            }

            if entry.id >> 4 != MSM_DUMP_DATA_CPU_CTX {
                continue;
            }
            if entry.address == 0 {
                continue;
            }

            let mut data_bytes = [0u8; std::mem::size_of::<RawDumpData>()];
            if reader.read(Address::from(entry.address), &mut data_bytes).is_err() {
                continue;
            }
            let data = *dataview::DataView::from(&data_bytes[..]).get::<RawDumpData>(0);
            if data.magic != DATA_MAGIC {
                log::warn!("ap_reg: cpu-ctx data entry has bad magic, skipping");
                continue;
            }

            let cpu_ctxt_pa = Address::from(data.address);
            let mut status_bytes = [0u8; NUM_CPU_STATUS_ENTRIES * 4];
            reader.read(cpu_ctxt_pa, &mut status_bytes)?;
            let regs_pa = cpu_ctxt_pa + (NUM_CPU_STATUS_ENTRIES * 4) as u64;

            if is_arm64 {
                let mut regs_bytes = vec![0u8; std::mem::size_of::<Cpu64Regs>()];
                reader.read(regs_pa, &mut regs_bytes)?;
                let regs = *dataview::DataView::from(&regs_bytes[..]).get::<Cpu64Regs>(0);
                overlays.push(ModernOverlay::Arm64 {
                    cpu_index,
                    context: arm64_context_from_regs(&regs),
                });
            } else {
                let mut regs_bytes = vec![0u8; std::mem::size_of::<Cpu32Regs>()];
                reader.read(regs_pa, &mut regs_bytes)?;
                let regs = *dataview::DataView::from(&regs_bytes[..]).get::<Cpu32Regs>(0);
                overlays.push(ModernOverlay::Arm32 {
                    cpu_index,
                    context: arm_context_from_regs(&regs),
                });
            }
            cpu_index += 1;
            let _ = CPU_CTXT_SIZE;
        }
    }

    Ok(overlays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CursorByteSource;
    use crate::memmap::{DdrRegion, RegionKind};

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

    #[test]
    fn skip_predicate_matches_warm_boot_sgi_combo() {
        let status = CpuStatus::WARM_BOOT | CpuStatus::SGI;
        assert!(should_skip_overlay(status, AP_REG_STRUCTURE_V2));
    }

    #[test]
    fn skip_predicate_false_on_healthy_v2_status() {
        let status = CpuStatus::NS | CpuStatus::CPU_CONTEXT;
        assert!(!should_skip_overlay(status, AP_REG_STRUCTURE_V2));
    }

    #[test]
    fn v4_requires_dbi_rsvd_or_cpu_context() {
        let status = CpuStatus::NS;
        assert!(should_skip_overlay(status, AP_REG_STRUCTURE_V4));
        let status2 = CpuStatus::NS | CpuStatus::CPU_CONTEXT;
        assert!(!should_skip_overlay(status2, AP_REG_STRUCTURE_V4));
    }

    #[test]
    fn overlay_selects_svc_bank_sp_lr() {
        let mut ctx = SecureCpuContext {
            mon_lr: 0x1234,
            mon_spsr: 0x13, // SVC mode
            usr_r: [0; 13],
            usr_r13: 0xAAAA,
            usr_r14: 0xBBBB,
            irq_spsr: 0,
            irq_r13: 0,
            irq_r14: 0,
            svc_spsr: 0,
            svc_r13: 0xCCCC,
            svc_r14: 0xDDDD,
            abt_spsr: 0,
            abt_r13: 0,
            abt_r14: 0,
            und_spsr: 0,
            und_r13: 0,
            und_r14: 0,
            fiq_spsr: 0,
            fiq_r8: 0,
            fiq_r9: 0,
            fiq_r10: 0,
            fiq_r11: 0,
            fiq_r12: 0,
            fiq_r13: 0,
            fiq_r14: 0,
        };
        ctx.usr_r[0] = 0x11;
        let overlay = overlay_from_secure_context(&ctx);
        assert_eq!(overlay.sp, 0xCCCC);
        assert_eq!(overlay.lr, 0xDDDD);
        assert_eq!(overlay.pc, 0x1234);
        assert_eq!(overlay.r[0], 0x11);
    }

    #[test]
    fn parse_legacy_rejects_bad_magic() {
        let data = vec![0u8; 0x100];
        let region = flat_region(data.len() as u64);
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut reader = PhysicalReader::new(&mut src, &regions);
        let err = parse_legacy(&mut reader, Address::NULL).unwrap_err();
        assert_eq!(err.1, ErrorKind::NoAPReg);
    }

    #[test]
    fn parse_legacy_reads_one_cpu_from_status_then_context_arrays() {
        let cpu_count = 2u32;
        let header = ApRegHeader {
            magic: AP_REG_STRUCTURE_MAGIC_VALUE,
            version: AP_REG_STRUCTURE_V2,
            cpu_count,
        };
        let status_array_pa = std::mem::size_of::<ApRegHeader>() as u64;
        let nsc_size = std::mem::size_of::<NonSecureCpuContext>() as u64;
        let context_array_pa = status_array_pa + cpu_count as u64 * 4;
        let mut data = vec![0u8; (context_array_pa + cpu_count as u64 * nsc_size) as usize];

        data[0..std::mem::size_of::<ApRegHeader>()].copy_from_slice(dataview::Pod::as_bytes(&header));

        // cpu 0: healthy NS status, cpu 1: warm-boot+sgi, should be skipped.
        let status0 = (CpuStatus::NS | CpuStatus::CPU_CONTEXT).bits().to_le_bytes();
        let status1 = (CpuStatus::WARM_BOOT | CpuStatus::SGI).bits().to_le_bytes();
        data[status_array_pa as usize..status_array_pa as usize + 4].copy_from_slice(&status0);
        data[status_array_pa as usize + 4..status_array_pa as usize + 8].copy_from_slice(&status1);

        let mut nsc0 = NonSecureCpuContext {
            saved_ctx: SecureCpuContext {
                mon_lr: 0xF00D,
                mon_spsr: 0x13, // SVC
                usr_r: [0; 13],
                usr_r13: 0,
                usr_r14: 0,
                irq_spsr: 0,
                irq_r13: 0,
                irq_r14: 0,
                svc_spsr: 0,
                svc_r13: 0x5151,
                svc_r14: 0x6161,
                abt_spsr: 0,
                abt_r13: 0,
                abt_r14: 0,
                und_spsr: 0,
                und_r13: 0,
                und_r14: 0,
                fiq_spsr: 0,
                fiq_r8: 0,
                fiq_r9: 0,
                fiq_r10: 0,
                fiq_r11: 0,
                fiq_r12: 0,
                fiq_r13: 0,
                fiq_r14: 0,
            },
            mon_sp: 0,
            wdog_pc: 0,
        };
        nsc0.saved_ctx.usr_r[0] = 0x42;
        let ctx0_off = context_array_pa as usize;
        data[ctx0_off..ctx0_off + nsc_size as usize].copy_from_slice(dataview::Pod::as_bytes(&nsc0));

        let region = flat_region(data.len() as u64);
        let mut src = CursorByteSource::new(data);
        let regions = vec![region];
        let mut reader = PhysicalReader::new(&mut src, &regions);

        let overlays = parse_legacy(&mut reader, Address::NULL).unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].cpu_index, 0);
        assert_eq!(overlays[0].context.pc, 0xF00D);
        assert_eq!(overlays[0].context.sp, 0x5151);
        assert_eq!(overlays[0].context.lr, 0x6161);
        assert_eq!(overlays[0].context.r[0], 0x42);
    }
}
