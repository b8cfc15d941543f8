/*!
rawdump2dmp converts a raw embedded-device DRAM panic snapshot — the
`RAW_DMP!`-tagged container a device writes out on a fatal reset — into a
Windows-style kernel minidump that existing crash-analysis tooling can load.

The container carries one or more DDR (memory) sections alongside
device-vendor-specific ("SV") blobs; somewhere inside the DDR payload sits an
embedded `DUMP_HEADER`/`DUMP_HEADER64` the device's own crash handler already
wrote. This crate locates that header, validates it against the container's
own memory map, copies the OS-visible memory runs it describes into a dump
file, reconstructs each CPU's `CONTEXT` record by walking `KPRCB` from the
embedded `KDDEBUGGER_DATA64` block (optionally patched with AP_REG-captured
register state), and appends everything else — the original section table,
legacy CPU context, SV sections, the memory map, and leftover non-OS DDR — as
a secondary data blob stream.

[`engine::convert`] is the single entry point; see its doc comment for the
full pipeline. [`config::RunConfig`] controls the run, and [`io::ByteSource`]
is the positioned-read/write boundary callers implement over a file, a block
device, or an in-memory buffer.
*/

pub mod error;

pub mod io;

pub mod config;

pub mod types;

pub mod container;

pub mod memmap;

pub mod physical_reader;

pub mod arch;

pub mod virt;

pub mod symbolic;

pub mod dumpheader;

pub mod memblock;

pub mod completemap;

pub mod device_info;

pub mod writer;

pub mod svtable;

pub mod secondary;

pub mod cpu_context;

pub mod kdbg;

pub mod apreg;

pub mod context;

pub mod engine;

pub mod prelude {
    pub mod v1 {
        pub use crate::config::*;
        pub use crate::engine::{convert, RunReport};
        pub use crate::error::*;
        pub use crate::io::*;
        pub use crate::types::*;
    }
    pub use v1::*;
}
