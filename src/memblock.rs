/*!
Component H: verify that every physical-memory-block run declared in the dump
header lies entirely within contiguous DDR, per §4.H.
*/

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::memmap::{self, DdrRegion};
use crate::types::{Address, PAGE_SIZE};

#[derive(Copy, Clone, Debug)]
pub struct ValidatedRun {
    pub base: Address,
    pub end: Address,
    pub page_count: u64,
}

/// Validates `runs` (page-granular `(base_page, page_count)` pairs from the
/// dump header's `PhysicalMemoryBlock`) against the DDR map. A run is only
/// accepted if its start and end page both resolve to the same contiguous
/// span of DDR regions; anything else is a fatal `InvalidTranslation`, since a
/// dump describing memory the input container doesn't actually have would
/// produce a corrupt output file.
pub fn validate(regions: &[DdrRegion], runs: &[(u64, u64)]) -> Result<Vec<ValidatedRun>> {
    let mut validated = Vec::with_capacity(runs.len());

    for (i, &(base_page, page_count)) in runs.iter().enumerate() {
        if page_count == 0 {
            continue;
        }
        let base = Address::from(base_page * PAGE_SIZE);
        let end = base + (page_count * PAGE_SIZE - 1);

        let first = memmap::find(regions, base).ok_or_else(|| {
            Error(ErrorOrigin::MemoryBlockValidator, ErrorKind::InvalidTranslation)
                .log_error(format!("run {} base=0x{:x} not backed by ddr", i, base))
        })?;
        let last = memmap::find(regions, end).ok_or_else(|| {
            Error(ErrorOrigin::MemoryBlockValidator, ErrorKind::InvalidTranslation)
                .log_error(format!("run {} end=0x{:x} not backed by ddr", i, end))
        })?;

        if first.ddr_index != last.ddr_index {
            let spanned: Vec<&DdrRegion> = regions
                .iter()
                .filter(|r| r.base <= end && r.end >= base)
                .collect();
            if spanned.iter().any(|r| !r.contiguous) {
                return Err(Error(ErrorOrigin::MemoryBlockValidator, ErrorKind::SpanDiscontiguous)
                    .log_error(format!("run {} base=0x{:x} end=0x{:x}", i, base, end)));
            }
        }

        validated.push(ValidatedRun {
            base,
            end,
            page_count,
        });
    }

    Ok(validated)
}
