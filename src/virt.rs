/*!
Component F: read bytes at a virtual address. Translates through an optional
symbolic source first, falling back to manual page-table walking, and refuses
any read that would straddle a page it has not yet translated.
*/

use crate::arch::{self, PagingMode};
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};
use crate::physical_reader::PhysicalReader;
use crate::symbolic::SymbolicReader;
use crate::types::{Address, LARGE_PAGE_SIZE, PAGE_SIZE};

/// Composes page-table translation with the physical reader, per §4.F.
pub struct VirtualReader<'a, 'b> {
    reader: &'a mut PhysicalReader<'b>,
    mode: PagingMode,
    dtb: Address,
    symbolic: Option<&'a mut dyn SymbolicReader>,
}

impl<'a, 'b> VirtualReader<'a, 'b> {
    pub fn new(reader: &'a mut PhysicalReader<'b>, mode: PagingMode, dtb: Address) -> Self {
        VirtualReader {
            reader,
            mode,
            dtb,
            symbolic: None,
        }
    }

    pub fn with_symbolic(mut self, symbolic: &'a mut dyn SymbolicReader) -> Self {
        self.symbolic = Some(symbolic);
        self
    }

    /// Reads `buf.len()` bytes starting at `va`, returning the physical address
    /// the read ultimately resolved to. Rejects a read whose span crosses a page
    /// boundary (4 KiB, or `LARGE_PAGE_SIZE` when the caller knows it is backed by
    /// a large page) since a single translation cannot cover both sides.
    pub fn read(&mut self, va: Address, buf: &mut [u8], page_size: u64) -> Result<Address> {
        if buf.is_empty() {
            return Err(Error(ErrorOrigin::VirtualReader, ErrorKind::IncompleteRead)
                .log_error("zero-length read"));
        }
        let end = va + (buf.len() as u64 - 1);
        if va.as_page_aligned(page_size) != end.as_page_aligned(page_size) {
            return Err(Error(ErrorOrigin::VirtualReader, ErrorKind::CrossesPageBoundary)
                .log_error(format!("va=0x{:x} len={}", va, buf.len())));
        }

        if let Some(symbolic) = self.symbolic.as_deref_mut() {
            match symbolic.va_to_pa(va) {
                Ok(pa) => {
                    symbolic.read_virtual(va, buf)?;
                    return Ok(pa);
                }
                Err(e) => {
                    e.log_debug("symbolic lookup failed, falling back to page walk");
                }
            }
        }

        let pa = arch::translate(self.mode, self.reader, self.dtb, va)?;
        self.reader.read(pa, buf)?;
        Ok(pa)
    }

    /// Convenience wrapper for the common 4 KiB case.
    pub fn read_page_local(&mut self, va: Address, buf: &mut [u8]) -> Result<Address> {
        self.read(va, buf, PAGE_SIZE)
    }

    pub fn read_large_page_local(&mut self, va: Address, buf: &mut [u8]) -> Result<Address> {
        self.read(va, buf, LARGE_PAGE_SIZE)
    }

    /// Re-borrows the underlying physical reader, for callers that need a
    /// plain physical-address read (a PA fallback path, say) without pulling
    /// in a second, aliasing `PhysicalReader` over the same input.
    pub fn physical(&mut self) -> &mut PhysicalReader<'b> {
        self.reader
    }
}
