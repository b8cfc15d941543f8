/*!
`DeviceSpecificInfo`: the optional 1024-byte trailer written at
`ByteSource.size() - 1024`, used in lieu of an external XML metadata file to
carry the expected dump instance id, bugcheck parameters, and (for
architectures where the OS-saved `CONTEXT` cannot be found via
`KdDebuggerDataBlock`) a raw CPU-context or AP_REG address directly (§3, §4.M
"alternate path").
*/

use dataview::Pod;

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::types::Address;

pub const DEVICE_SPECIFIC_INFO_SIZE: u64 = 1024;

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessorArch {
    Arm = 0,
    Arm64 = 1,
    X86 = 2,
    Amd64 = 3,
    Unknown = 0xFFFF_FFFF,
}

impl ProcessorArch {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => ProcessorArch::Arm,
            1 => ProcessorArch::Arm64,
            2 => ProcessorArch::X86,
            3 => ProcessorArch::Amd64,
            _ => ProcessorArch::Unknown,
        }
    }

    pub fn to_architecture(self) -> Option<crate::cpu_context::Architecture> {
        match self {
            ProcessorArch::Arm => Some(crate::cpu_context::Architecture::Arm),
            ProcessorArch::Arm64 => Some(crate::cpu_context::Architecture::Arm64),
            ProcessorArch::X86 => Some(crate::cpu_context::Architecture::X86),
            ProcessorArch::Amd64 => Some(crate::cpu_context::Architecture::Amd64),
            ProcessorArch::Unknown => None,
        }
    }
}

/// Raw on-disk layout of the trailer. Unused reserved bytes pad it out to
/// exactly [`DEVICE_SPECIFIC_INFO_SIZE`].
#[repr(C)]
#[derive(Clone, Copy, Pod)]
struct RawDeviceSpecificInfo {
    processor_arch: u32,
    dump_header_instance_id: u64,
    /// Either a `CONTEXT` VA (when contexts are found via KdDebuggerDataBlock)
    /// or an `AP_REG` physical address (when "context PAs already known").
    cpu_context_address: u64,
    ap_reg_pa: u64,
    in_mem_data_va: u64,
    in_mem_data_pa: u64,
    in_mem_data_size: u64,
    bug_check_code: u32,
    bug_check_parameter: [u32; 4],
    _reserved: [u8; DEVICE_SPECIFIC_INFO_SIZE as usize - 68],
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceSpecificInfo {
    pub processor_arch: ProcessorArch,
    pub dump_header_instance_id: u64,
    pub cpu_context_address: Address,
    pub ap_reg_pa: Address,
    pub in_mem_data_va: Address,
    pub in_mem_data_pa: Address,
    pub in_mem_data_size: u64,
    pub bug_check_code: u32,
    pub bug_check_parameter: [u32; 4],
}

/// Reads and decodes the trailer at `source.size() - DEVICE_SPECIFIC_INFO_SIZE`.
/// Absence of a recognizable trailer is not itself an error here — the caller
/// (the entry point) decides whether an external XML-equivalent is required.
pub fn read(source: &mut dyn ByteSource) -> Result<DeviceSpecificInfo> {
    let size = source.size()?;
    if size < DEVICE_SPECIFIC_INFO_SIZE {
        return Err(Error(ErrorOrigin::Other, ErrorKind::NotFound)
            .log_warn("container too small to carry a device-specific-info trailer"));
    }
    let offset = size - DEVICE_SPECIFIC_INFO_SIZE;
    let mut buf = vec![0u8; DEVICE_SPECIFIC_INFO_SIZE as usize];
    source.read_at(offset, &mut buf)?;
    let raw = *dataview::DataView::from(&buf[..]).get::<RawDeviceSpecificInfo>(0);

    Ok(DeviceSpecificInfo {
        processor_arch: ProcessorArch::from_u32(raw.processor_arch),
        dump_header_instance_id: raw.dump_header_instance_id,
        cpu_context_address: Address::from(raw.cpu_context_address),
        ap_reg_pa: Address::from(raw.ap_reg_pa),
        in_mem_data_va: Address::from(raw.in_mem_data_va),
        in_mem_data_pa: Address::from(raw.in_mem_data_pa),
        in_mem_data_size: raw.in_mem_data_size,
        bug_check_code: raw.bug_check_code,
        bug_check_parameter: raw.bug_check_parameter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CursorByteSource;

    fn fixture(instance_id: u64) -> RawDeviceSpecificInfo {
        RawDeviceSpecificInfo {
            processor_arch: 1,
            dump_header_instance_id: instance_id,
            cpu_context_address: 0,
            ap_reg_pa: 0x1000,
            in_mem_data_va: 0,
            in_mem_data_pa: 0,
            in_mem_data_size: 0,
            bug_check_code: 0xEF,
            bug_check_parameter: [1, 2, 3, 4],
            _reserved: [0u8; DEVICE_SPECIFIC_INFO_SIZE as usize - 68],
        }
    }

    #[test]
    fn reads_trailer_at_end_of_container() {
        let mut data = vec![0u8; 0x2000];
        let trailer = fixture(0xDEAD_BEEF_0000_0001);
        let offset = data.len() - DEVICE_SPECIFIC_INFO_SIZE as usize;
        data[offset..].copy_from_slice(dataview::Pod::as_bytes(&trailer));

        let mut src = CursorByteSource::new(data);
        let info = read(&mut src).unwrap();
        assert_eq!(info.processor_arch, ProcessorArch::Arm64);
        assert_eq!(info.dump_header_instance_id, 0xDEAD_BEEF_0000_0001);
        assert_eq!(info.bug_check_parameter, [1, 2, 3, 4]);
    }

    #[test]
    fn too_small_container_is_rejected() {
        let mut src = CursorByteSource::new(vec![0u8; 16]);
        let err = read(&mut src).unwrap_err();
        assert_eq!(err.1, ErrorKind::NotFound);
    }
}
