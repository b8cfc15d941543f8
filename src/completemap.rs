/*!
Component I: interleave the DDR map with the dump header's validated OS runs
into a single ordered list of [`CompleteMemoryRegion`]s, tagging each stretch
OS, NonOs, or Na per §4.I.

A stretch of DDR covered by a validated `PhysicalMemoryBlock` run is OS memory
(it is what the dump header actually describes and will be copied into the
output verbatim). Any DDR left over is either NonOs (small, low-addressed
leftover memory worth preserving as a secondary-data blob) or Na (everything
else) — the dividing line is [`RunConfig::non_os_memory_limit`] /
[`RunConfig::non_os_size_limit`], copied as-is from the original tool's
heuristic and not independently re-derived (§9 design notes).
*/

use crate::config::RunConfig;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::memblock::ValidatedRun;
use crate::memmap::{DdrRegion, RegionKind};
use crate::types::Address;

#[derive(Clone, Debug)]
pub struct CompleteMemoryRegion {
    pub base: Address,
    pub end: Address,
    pub kind: RegionKind,
    pub ddr_index: usize,
}

fn classify_leftover(base: Address, size: u64, config: &RunConfig) -> RegionKind {
    if base.as_u64() < config.non_os_memory_limit || size < config.non_os_size_limit {
        RegionKind::NonOs
    } else {
        RegionKind::Na
    }
}

/// Builds the complete, gap-filling region list. `runs` must already be
/// validated against `regions` (see [`crate::memblock::validate`]).
pub fn build(
    regions: &[DdrRegion],
    runs: &[ValidatedRun],
    config: &RunConfig,
) -> Result<Vec<CompleteMemoryRegion>> {
    let mut out = Vec::new();
    let total_ddr_bytes: u64 = regions.iter().map(|r| r.size).sum();
    let mut total_nonos_bytes = 0u64;
    let mut size_from_descriptors = 0u64;

    for region in regions {
        let mut cursor = region.base;
        let mut covering: Vec<&ValidatedRun> = runs
            .iter()
            .filter(|r| r.end >= region.base && r.base <= region.end)
            .collect();
        covering.sort_by(|a, b| a.base.cmp(&b.base));

        for run in covering {
            let run_base = run.base.max(region.base);
            let run_end = run.end.min(region.end);

            if cursor < run_base {
                let gap_size = run_base - cursor;
                let kind = classify_leftover(cursor, gap_size, config);
                if kind == RegionKind::NonOs {
                    total_nonos_bytes += gap_size;
                }
                out.push(CompleteMemoryRegion {
                    base: cursor,
                    end: run_base - 1u64,
                    kind,
                    ddr_index: region.ddr_index,
                });
            }

            size_from_descriptors += (run_end - run_base) + 1;
            out.push(CompleteMemoryRegion {
                base: run_base,
                end: run_end,
                kind: RegionKind::Os,
                ddr_index: region.ddr_index,
            });
            cursor = run_end + 1u64;
        }

        if cursor <= region.end {
            let gap_size = (region.end - cursor) + 1;
            let kind = classify_leftover(cursor, gap_size, config);
            if kind == RegionKind::NonOs {
                total_nonos_bytes += gap_size;
            }
            out.push(CompleteMemoryRegion {
                base: cursor,
                end: region.end,
                kind,
                ddr_index: region.ddr_index,
            });
        }
    }

    if total_nonos_bytes + size_from_descriptors > total_ddr_bytes {
        return Err(Error(ErrorOrigin::CompleteMap, ErrorKind::InvalidTranslation).log_error(
            format!(
                "nonos={} os={} exceeds total ddr={}",
                total_nonos_bytes, size_from_descriptors, total_ddr_bytes
            ),
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: u64, size: u64, ddr_index: usize) -> DdrRegion {
        DdrRegion {
            base: Address::from(base),
            end: Address::from(base + size - 1),
            size,
            offset: 0,
            contiguous: true,
            kind: RegionKind::Na,
            ddr_index,
        }
    }

    #[test]
    fn fully_covered_region_is_all_os() {
        let regions = vec![region(0x0, 0x1000, 0)];
        let runs = vec![ValidatedRun {
            base: Address::from(0x0u64),
            end: Address::from(0xFFFu64),
            page_count: 1,
        }];
        let config = RunConfig::default();
        let complete = build(&regions, &runs, &config).unwrap();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].kind, RegionKind::Os);
    }

    #[test]
    fn leading_gap_classified_by_size_and_base() {
        let regions = vec![region(0x0, 0x2000, 0)];
        let runs = vec![ValidatedRun {
            base: Address::from(0x1000u64),
            end: Address::from(0x1FFFu64),
            page_count: 1,
        }];
        let mut config = RunConfig::default();
        config.non_os_size_limit = 0x2000;
        config.non_os_memory_limit = 0x2000;
        let complete = build(&regions, &runs, &config).unwrap();
        assert_eq!(complete.len(), 2);
        assert_eq!(complete[0].kind, RegionKind::NonOs);
        assert_eq!(complete[1].kind, RegionKind::Os);
    }

    #[test]
    fn large_gap_above_both_thresholds_is_na() {
        // gap base (0x3000_1000) is above NON_OS_MEMORY_LIMIT and its size is
        // above NON_OS_SIZE_LIMIT, so neither disjunct of the heuristic fires.
        let regions = vec![region(0x3000_0000, 0x4000_0000, 0)];
        let runs = vec![ValidatedRun {
            base: Address::from(0x3000_0000u64),
            end: Address::from(0x3000_0FFFu64),
            page_count: 1,
        }];
        let config = RunConfig::default();
        let complete = build(&regions, &runs, &config).unwrap();
        assert_eq!(complete.len(), 2);
        assert_eq!(complete[1].kind, RegionKind::Na);
    }

    #[test]
    fn gap_below_memory_limit_is_nonos_even_if_large() {
        let regions = vec![region(0x0, 0x4000_0000, 0)];
        let runs = vec![ValidatedRun {
            base: Address::from(0x3000_0000u64),
            end: Address::from(0x3FFF_FFFFu64),
            page_count: 1,
        }];
        let config = RunConfig::default();
        let complete = build(&regions, &runs, &config).unwrap();
        assert_eq!(complete.len(), 2);
        assert_eq!(complete[0].kind, RegionKind::NonOs);
    }
}
