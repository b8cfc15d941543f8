/*!
Specialized `Error` and `Result` types for the core.
*/

use std::fmt;
use std::result;

use log::{debug, error, info, trace, warn};

#[cfg(feature = "std")]
use std::error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Error(pub ErrorOrigin, pub ErrorKind);

impl Error {
    /// Returns a static string representing the kind of error.
    pub fn as_str(&self) -> &'static str {
        self.1.to_str()
    }

    pub fn log_error(self, context: impl fmt::Display) -> Self {
        error!("{}: {} ({})", self.0.to_str(), self.1.to_str(), context);
        self
    }

    pub fn log_warn(self, context: impl fmt::Display) -> Self {
        warn!("{}: {} ({})", self.0.to_str(), self.1.to_str(), context);
        self
    }

    pub fn log_info(self, context: impl fmt::Display) -> Self {
        info!("{}: {} ({})", self.0.to_str(), self.1.to_str(), context);
        self
    }

    pub fn log_debug(self, context: impl fmt::Display) -> Self {
        debug!("{}: {} ({})", self.0.to_str(), self.1.to_str(), context);
        self
    }

    pub fn log_trace(self, context: impl fmt::Display) -> Self {
        trace!("{}: {} ({})", self.0.to_str(), self.1.to_str(), context);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.0.to_str(), self.1.to_str())
    }
}

#[cfg(feature = "std")]
impl error::Error for Error {}

impl From<ErrorOrigin> for Error {
    fn from(origin: ErrorOrigin) -> Self {
        Error(origin, ErrorKind::Unknown)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(ErrorOrigin::Other, kind)
    }
}

/// Names the component that raised an [`Error`], mirroring the component table in
/// the system overview (components B through M, plus I/O and "other").
#[repr(u16)]
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorOrigin {
    Io,
    Container,
    MemoryMap,
    PhysicalReader,
    PageWalker,
    VirtualReader,
    DumpHeaderLocator,
    MemoryBlockValidator,
    CompleteMap,
    DumpWriter,
    SecondaryDataWriter,
    KdDebuggerDataBlock,
    ContextReconstructor,

    Other,
}

impl ErrorOrigin {
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorOrigin::Io => "io",
            ErrorOrigin::Container => "container",
            ErrorOrigin::MemoryMap => "memory map",
            ErrorOrigin::PhysicalReader => "physical reader",
            ErrorOrigin::PageWalker => "page walker",
            ErrorOrigin::VirtualReader => "virtual reader",
            ErrorOrigin::DumpHeaderLocator => "dump header locator",
            ErrorOrigin::MemoryBlockValidator => "memory block validator",
            ErrorOrigin::CompleteMap => "complete map",
            ErrorOrigin::DumpWriter => "dump writer",
            ErrorOrigin::SecondaryDataWriter => "secondary data writer",
            ErrorOrigin::KdDebuggerDataBlock => "kd debugger data block",
            ErrorOrigin::ContextReconstructor => "context reconstructor",
            ErrorOrigin::Other => "other",
        }
    }
}

/// The flat union of the six kind-enums from the error handling design: IoError,
/// ContainerError, MapError, TranslationError, LookupError, OutputError.
#[repr(u16)]
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    // IoError
    NotFound,
    AccessDenied,
    ReadShort,
    WriteShort,
    Seek,

    // ContainerError
    BadSignature,
    BadVersion,
    BadFlags,
    DumpSizeZero,
    ZeroSections,
    InvalidSectionVersion,
    InvalidSectionFlags,
    InvalidSectionType,
    BadInsufficientStorageFlag,

    // MapError
    DdrOverlap,
    DdrSizeZero,
    DdrInverted,

    // TranslationError
    NonCanonicalVa,
    NullDtb,
    NullEntry,
    CrossesPageBoundary,
    InvalidTranslation,

    // LookupError
    DumpHeaderNotFound,
    DumpHeaderInvalid,
    InstanceMismatch,
    NoAPReg,
    InvalidKdBlock,

    // OutputError
    PartialWrite,
    BlobSizeMismatch,
    PagesWrittenMismatch,
    SpanDiscontiguous,
    IncompleteRead,

    Unknown,
}

impl ErrorKind {
    pub fn to_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::ReadShort => "short read",
            ErrorKind::WriteShort => "short write",
            ErrorKind::Seek => "seek failed",

            ErrorKind::BadSignature => "bad signature",
            ErrorKind::BadVersion => "bad version",
            ErrorKind::BadFlags => "bad flags",
            ErrorKind::DumpSizeZero => "dump size is zero",
            ErrorKind::ZeroSections => "zero sections",
            ErrorKind::InvalidSectionVersion => "invalid section version",
            ErrorKind::InvalidSectionFlags => "invalid section flags",
            ErrorKind::InvalidSectionType => "invalid section type",
            ErrorKind::BadInsufficientStorageFlag => {
                "insufficient storage flag on non-last section"
            }

            ErrorKind::DdrOverlap => "ddr region overlap",
            ErrorKind::DdrSizeZero => "ddr region size is zero",
            ErrorKind::DdrInverted => "ddr region end before base",

            ErrorKind::NonCanonicalVa => "non-canonical virtual address",
            ErrorKind::NullDtb => "null directory table base",
            ErrorKind::NullEntry => "null page table entry",
            ErrorKind::CrossesPageBoundary => "read crosses page boundary",
            ErrorKind::InvalidTranslation => "invalid translation",

            ErrorKind::DumpHeaderNotFound => "dump header not found",
            ErrorKind::DumpHeaderInvalid => "dump header invalid",
            ErrorKind::InstanceMismatch => "instance id mismatch",
            ErrorKind::NoAPReg => "no ap_reg info",
            ErrorKind::InvalidKdBlock => "invalid kd debugger data block",

            ErrorKind::PartialWrite => "partial write",
            ErrorKind::BlobSizeMismatch => "blob size mismatch",
            ErrorKind::PagesWrittenMismatch => "pages written mismatch",
            ErrorKind::SpanDiscontiguous => "span crosses discontiguous regions",
            ErrorKind::IncompleteRead => "incomplete read",

            ErrorKind::Unknown => "unknown",
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_combines_origin_and_kind() {
        let err = Error(ErrorOrigin::Container, ErrorKind::BadSignature);
        assert_eq!(format!("{}", err), "container: bad signature");
    }

    #[test]
    fn from_kind_defaults_origin_to_other() {
        let err: Error = ErrorKind::Unknown.into();
        assert_eq!(err.0, ErrorOrigin::Other);
    }
}
