/*!
`ByteSource`: the positioned-read/write abstraction the core is built against.

The block-device/partition I/O layer, block caching, and GPT partition discovery
are external collaborators (§1); this module only defines the trait boundary and
a straightforward file-backed implementation, plus (under `#[cfg(test)]`) an
in-memory fixture used by every other module's unit tests.
*/

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

/// Positioned random-access byte storage. Grounded on the introspection-framework
/// lineage's `PhysicalMemory`/file connector split: reads and writes are always
/// addressed explicitly rather than relying on an implicit cursor, so callers
/// never need to interleave `seek` with `read`/`write` themselves.
pub trait ByteSource {
    /// Total size of the backing storage in bytes.
    fn size(&mut self) -> Result<u64>;

    /// Reads `buf.len()` bytes starting at `offset`. Short reads are an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `buf` starting at `offset`. Short writes are an error.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flushes any buffered writes. The writer components call this after each
    /// section so that partial failures do not lose more than one section's data.
    fn flush(&mut self) -> Result<()>;
}

/// File-backed `ByteSource`, the concrete implementation used outside of tests.
pub struct FileByteSource {
    file: File,
}

impl FileByteSource {
    pub fn new(file: File) -> Self {
        FileByteSource { file }
    }
}

impl ByteSource for FileByteSource {
    fn size(&mut self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::NotFound).log_error(e))
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::Seek).log_error(e))?;
        self.file
            .read_exact(buf)
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::ReadShort).log_error(e))
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::Seek).log_error(e))?;
        self.file
            .write_all(buf)
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::WriteShort).log_error(e))
    }

    fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::PartialWrite).log_error(e))
    }
}

#[cfg(test)]
pub struct CursorByteSource {
    pub buf: std::io::Cursor<Vec<u8>>,
}

#[cfg(test)]
impl CursorByteSource {
    pub fn new(data: Vec<u8>) -> Self {
        CursorByteSource {
            buf: std::io::Cursor::new(data),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf.into_inner()
    }
}

#[cfg(test)]
impl ByteSource for CursorByteSource {
    fn size(&mut self) -> Result<u64> {
        Ok(self.buf.get_ref().len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.buf
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::Seek).log_error(e))?;
        self.buf
            .read_exact(buf)
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::ReadShort).log_error(e))
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let end = offset as usize + buf.len();
        if end > self.buf.get_ref().len() {
            self.buf.get_mut().resize(end, 0);
        }
        self.buf
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::Seek).log_error(e))?;
        self.buf
            .write_all(buf)
            .map_err(|e| Error(ErrorOrigin::Io, ErrorKind::WriteShort).log_error(e))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
