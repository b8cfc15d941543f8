/*!
Component D: read bytes at a physical address, transparently spanning
contiguous DDR regions, and (symmetrically) write bytes to the output dump by
physical address against its own physical-memory-run map.
*/

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::io::ByteSource;
use crate::memmap::{self, DdrRegion};
use crate::types::Address;

/// Reads from the input container's DDR regions (§4.D, read path).
pub struct PhysicalReader<'a> {
    source: &'a mut dyn ByteSource,
    regions: &'a [DdrRegion],
}

impl<'a> PhysicalReader<'a> {
    pub fn new(source: &'a mut dyn ByteSource, regions: &'a [DdrRegion]) -> Self {
        PhysicalReader { source, regions }
    }

    pub fn read(&mut self, pa: Address, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u64;
        if len == 0 {
            return Ok(());
        }
        let end = pa + len.wrapping_sub(1);

        let mut cursor = pa;
        let mut written = 0usize;
        let mut first = true;

        while written < buf.len() {
            let region = memmap::find(self.regions, cursor).ok_or_else(|| {
                Error(ErrorOrigin::PhysicalReader, ErrorKind::IncompleteRead)
                    .log_error(format!("no ddr region contains pa=0x{:x}", cursor))
            })?;

            if !first && !region.contiguous {
                return Err(Error(ErrorOrigin::PhysicalReader, ErrorKind::SpanDiscontiguous)
                    .log_error(format!("pa=0x{:x}", cursor)));
            }
            first = false;

            let span_end = region.end.min(end);
            let to_read = (span_end - cursor) + 1;
            let off = region.offset + (cursor - region.base);

            let chunk = &mut buf[written..written + to_read as usize];
            self.source.read_at(off, chunk)?;

            written += to_read as usize;
            cursor = cursor + to_read;
        }

        Ok(())
    }
}

/// A single run of the output dump's `PhysicalMemoryBlock`, used to resolve
/// `write_by_pa` addresses to output file offsets (§4.D, write path).
#[derive(Copy, Clone, Debug)]
pub struct OutputRun {
    pub base: Address,
    pub end: Address,
}

pub struct OutputWriter<'a> {
    output: &'a mut dyn ByteSource,
    runs: &'a [OutputRun],
    ddr_file_offset: u64,
}

impl<'a> OutputWriter<'a> {
    pub fn new(output: &'a mut dyn ByteSource, runs: &'a [OutputRun], ddr_file_offset: u64) -> Self {
        OutputWriter {
            output,
            runs,
            ddr_file_offset,
        }
    }

    pub fn write_by_pa(&mut self, pa: Address, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u64;
        if len == 0 {
            return Ok(());
        }
        let end = pa + len.wrapping_sub(1);
        let mut cursor = pa;
        let mut written = 0usize;

        loop {
            let run = self
                .runs
                .iter()
                .find(|r| cursor >= r.base && cursor <= r.end)
                .ok_or_else(|| {
                    Error(ErrorOrigin::PhysicalReader, ErrorKind::IncompleteRead)
                        .log_error(format!("no output run contains pa=0x{:x}", cursor))
                })?;

            // file offset of this run's start = ddr_file_offset + byte-count of every
            // preceding run (runs are concatenated in order in the output payload)
            let mut preceding = 0u64;
            for r in self.runs {
                if r.base == run.base && r.end == run.end {
                    break;
                }
                preceding += (r.end - r.base) + 1;
            }

            let span_end = run.end.min(end);
            let to_write = (span_end - cursor) + 1;
            let off = self.ddr_file_offset + preceding + (cursor - run.base);

            let chunk = &bytes[written..written + to_write as usize];
            self.output.write_at(off, chunk)?;

            written += to_write as usize;
            cursor = cursor + to_write;
            if written >= bytes.len() {
                break;
            }
        }

        Ok(())
    }
}
