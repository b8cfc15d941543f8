/*!
Component C: build an ordered, overlap-free, gap-tolerant physical memory map
from the container's DDR sections.

Grounded loosely on the introspection-framework lineage's `MemoryMap` (sorted
regions, contiguity tracking) but simplified to a single concrete element type
and a one-shot `build()` rather than a generic, iterator-based structure — this
crate only ever needs "given a physical address, find the containing region",
never the batched/generic lookup the teacher's `MemoryMap<M>` supports.
*/

use crate::container::SectionHeader;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::types::Address;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionKind {
    Os,
    NonOs,
    Na,
}

#[derive(Clone, Debug)]
pub struct DdrRegion {
    pub base: Address,
    pub end: Address,
    pub size: u64,
    pub offset: u64,
    pub contiguous: bool,
    pub kind: RegionKind,
    pub ddr_index: usize,
}

impl DdrRegion {
    pub fn contains(&self, pa: Address) -> bool {
        pa >= self.base && pa <= self.end
    }
}

/// Builds the sorted DDR map per §4.C. `sections` must already be filtered to
/// DDR_RANGE entries; `ddr_index` in the result refers to the position within
/// that filtered slice (the section's original table index, caller-supplied).
pub fn build(sections: &[(usize, &SectionHeader)]) -> Result<Vec<DdrRegion>> {
    let mut regions: Vec<DdrRegion> = sections
        .iter()
        .map(|(idx, s)| {
            let base = Address::from(s.base_physical_address());
            let size = s.size;
            DdrRegion {
                base,
                end: base + size.wrapping_sub(1),
                size,
                offset: s.offset,
                contiguous: false,
                kind: RegionKind::Na,
                ddr_index: *idx,
            }
        })
        .collect();

    regions.sort_by(|a, b| a.base.cmp(&b.base));

    for (i, region) in regions.iter().enumerate() {
        if region.size == 0 {
            return Err(Error(ErrorOrigin::MemoryMap, ErrorKind::DdrSizeZero)
                .log_error(format!("ddr_index={}", region.ddr_index)));
        }
        if region.end < region.base {
            return Err(Error(ErrorOrigin::MemoryMap, ErrorKind::DdrInverted)
                .log_error(format!("ddr_index={}", region.ddr_index)));
        }
        let _ = i;
    }

    for i in 0..regions.len() {
        if i == 0 {
            regions[0].contiguous = true;
            continue;
        }
        let prev_end = regions[i - 1].end;
        let cur_base = regions[i].base;
        if prev_end >= cur_base {
            return Err(Error(ErrorOrigin::MemoryMap, ErrorKind::DdrOverlap).log_error(format!(
                "region {} overlaps region {}",
                i - 1,
                i
            )));
        }
        regions[i].contiguous = prev_end + 1u64 == cur_base;
        if !regions[i].contiguous {
            log::info!(
                "memory map: gap between region {} (end={:x}) and region {} (base={:x})",
                i - 1,
                prev_end,
                i,
                cur_base
            );
        }
    }

    Ok(regions)
}

/// Finds the region containing `pa`, if any.
pub fn find(regions: &[DdrRegion], pa: Address) -> Option<&DdrRegion> {
    // regions are sorted by base; binary search on base, then confirm containment
    let idx = regions.partition_point(|r| r.base <= pa);
    if idx == 0 {
        return None;
    }
    let candidate = &regions[idx - 1];
    if candidate.contains(pa) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DumpFlags, SectionType, RAW_DUMP_SECTION_HEADER_VERSION};
    use crate::types::Guid;

    fn section(base: u64, size: u64, offset: u64) -> SectionHeader {
        SectionHeader::new(
            DumpFlags::VALID,
            RAW_DUMP_SECTION_HEADER_VERSION,
            SectionType::DdrRange,
            offset,
            size,
            "",
            base,
            Guid::NULL,
        )
    }

    #[test]
    fn sorts_and_marks_contiguity() {
        let s0 = section(0x1000_0000, 0x1000_0000, 0);
        let s1 = section(0x0, 0x1000_0000, 0x1000);
        let sections = vec![(1usize, &s1), (0usize, &s0)];
        let regions = build(&sections).unwrap();
        assert_eq!(regions[0].base.as_u64(), 0x0);
        assert_eq!(regions[1].base.as_u64(), 0x1000_0000);
        assert!(regions[0].contiguous);
        assert!(regions[1].contiguous);
    }

    #[test]
    fn detects_gap_as_non_fatal() {
        let s0 = section(0x0, 0x1000_0000, 0);
        let s1 = section(0x2001_0000, 0x1000_0000, 0x1000);
        let sections = vec![(0usize, &s0), (1usize, &s1)];
        let regions = build(&sections).unwrap();
        assert!(!regions[1].contiguous);
    }

    #[test]
    fn rejects_overlap() {
        let s0 = section(0x0, 0x2000, 0);
        let s1 = section(0x1000, 0x2000, 0x1000);
        let sections = vec![(0usize, &s0), (1usize, &s1)];
        let err = build(&sections).unwrap_err();
        assert_eq!(err.1, ErrorKind::DdrOverlap);
    }

    #[test]
    fn rejects_zero_size() {
        let s0 = section(0x0, 0, 0);
        let sections = vec![(0usize, &s0)];
        let err = build(&sections).unwrap_err();
        assert_eq!(err.1, ErrorKind::DdrSizeZero);
    }

    #[test]
    fn find_locates_containing_region() {
        let s0 = section(0x0, 0x1000, 0);
        let s1 = section(0x2000, 0x1000, 0x1000);
        let sections = vec![(0usize, &s0), (1usize, &s1)];
        let regions = build(&sections).unwrap();
        assert!(find(&regions, Address::from(0x500u64)).is_some());
        assert!(find(&regions, Address::from(0x1800u64)).is_none());
    }
}
