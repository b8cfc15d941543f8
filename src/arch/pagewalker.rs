/*!
VA -> PA translation for the three paging modes named in the design notes:
32-bit non-PAE, 32-bit PAE, and 64-bit 4-level. Formulas follow §4.E literally;
the 64-bit constants are cross-checked against the ARM64 page-table constants
recovered from `original_source/raw2dump/src/common.h`.
*/

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::physical_reader::PhysicalReader;
use crate::types::Address;

pub const PML4E_SHIFT: u32 = 39;
pub const PDPE_SHIFT: u32 = 30;
pub const PDE_SHIFT: u32 = 21;
pub const PTE_SHIFT: u32 = 12;
pub const VALID_PFN_MASK: u64 = 0x0000_FFFF_FFFF_F000;

const PS_BIT: u64 = 0x80;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PagingMode {
    Arm32,
    ArmPae,
    Arm64,
}

fn read_u32(reader: &mut PhysicalReader, addr: Address) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read(addr, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut PhysicalReader, addr: Address) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read(addr, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Dispatches to the mode-appropriate translation function. Keeps the
/// `VirtualReader` caller tag-unaware, per the design notes.
pub fn translate(
    mode: PagingMode,
    reader: &mut PhysicalReader,
    dtb: Address,
    va: Address,
) -> Result<Address> {
    if dtb.is_null() {
        return Err(
            Error(ErrorOrigin::PageWalker, ErrorKind::NullDtb).log_error("directory_table_base")
        );
    }
    match mode {
        PagingMode::Arm32 => translate_arm32(reader, dtb, va),
        PagingMode::ArmPae => translate_arm_pae(reader, dtb, va),
        PagingMode::Arm64 => translate_arm64(reader, dtb, va),
    }
}

fn translate_arm32(reader: &mut PhysicalReader, dtb: Address, va: Address) -> Result<Address> {
    let dtb = dtb.as_u64() & 0xFFFF_F000;
    let pde_addr = Address::from(dtb) + (va.as_u64() >> 22) * 4;
    let pde = read_u32(reader, pde_addr)?;
    if pde == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pde"));
    }

    if pde & 0x80 != 0 {
        // ARM-style large (4 MiB) page
        let pa = (pde as u64 & 0xFFC0_0000) | (va.as_u64() & 0x3F_FFFF);
        return Ok(Address::from(pa));
    }

    let pte_addr = Address::from(pde as u64 & 0xFFFF_F000) + ((va.as_u64() >> 12) & 0x3FF) * 4;
    let pte = read_u32(reader, pte_addr)?;
    if pte == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pte"));
    }
    let pa = (pte as u64 & 0xFFFF_F000) | (va.as_u64() & 0xFFF);
    Ok(Address::from(pa))
}

fn translate_arm_pae(reader: &mut PhysicalReader, dtb: Address, va: Address) -> Result<Address> {
    let v = va.as_u64();
    let dir_pointer = (v >> 30) & 0x3;
    let directory = (v >> 21) & 0x1FF;
    let table = (v >> 12) & 0x1FF;
    let offset = v & 0xFFF;

    let ppe_addr = Address::from(dtb.as_u64() & 0xFFFF_FFE0) + dir_pointer * 8;
    let ppe = read_u64(reader, ppe_addr)?;
    if ppe == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pdpte"));
    }

    let pde_addr = Address::from(ppe & 0xFFFF_F000) + directory * 8;
    let pde = read_u64(reader, pde_addr)?;
    if pde == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pde"));
    }

    let pte_addr = Address::from(pde & 0xFFFF_F000) + table * 8;
    let pte = read_u64(reader, pte_addr)?;
    if pte == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pte"));
    }

    let pa = (pte & 0xFFFF_F000) | offset;
    Ok(Address::from(pa))
}

fn translate_arm64(reader: &mut PhysicalReader, dtb: Address, va: Address) -> Result<Address> {
    let v = va.as_u64();
    let top16 = v >> 48;
    if top16 != 0x0000 && top16 != 0xFFFF {
        return Err(
            Error(ErrorOrigin::PageWalker, ErrorKind::NonCanonicalVa).log_error(format!("va=0x{:x}", v))
        );
    }

    let pml4e_addr = dtb + ((v >> PML4E_SHIFT) & 0x1FF) * 8;
    let pml4e = read_u64(reader, pml4e_addr)?;
    if pml4e == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pml4e"));
    }

    let pdpte_addr = Address::from(pml4e & VALID_PFN_MASK) + ((v >> PDPE_SHIFT) & 0x1FF) * 8;
    let pdpte = read_u64(reader, pdpte_addr)?;
    if pdpte == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pdpte"));
    }

    if pdpte & PS_BIT != 0 {
        let pa = (pdpte & 0xFFFF_C000_0000) | (v & 0x3FFF_FFFF);
        return Ok(Address::from(pa));
    }

    let pde_addr = Address::from(pdpte & VALID_PFN_MASK) + ((v >> PDE_SHIFT) & 0x1FF) * 8;
    let pde = read_u64(reader, pde_addr)?;
    if pde == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pde"));
    }

    if pde & PS_BIT != 0 {
        let pa = (pde & 0xFFFF_FFE0_0000) | (v & 0x1F_FFFF);
        return Ok(Address::from(pa));
    }

    let pte_addr = Address::from(pde & VALID_PFN_MASK) + ((v >> PTE_SHIFT) & 0x1FF) * 8;
    let pte = read_u64(reader, pte_addr)?;
    if pte == 0 {
        return Err(Error(ErrorOrigin::PageWalker, ErrorKind::NullEntry).log_error("pte"));
    }

    let pa = (pte & VALID_PFN_MASK) | (v & 0xFFF);
    Ok(Address::from(pa))
}
