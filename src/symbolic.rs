/*!
`SymbolicReader`: the external debugger-engine collaborator.

When present, [`VirtualReader`](crate::virt::VirtualReader) tries it before
falling back to manual page-table walking (§4.F). The core never constructs one
itself; it is always supplied by the caller.
*/

use crate::error::Result;
use crate::types::Address;

pub trait SymbolicReader {
    fn read_virtual(&mut self, va: Address, buf: &mut [u8]) -> Result<()>;
    fn va_to_pa(&mut self, va: Address) -> Result<Address>;
}
