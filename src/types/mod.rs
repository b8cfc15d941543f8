/*!
Core value types shared across every component.
*/

pub mod address;
pub mod guid;
pub mod size;

pub use address::Address;
pub use guid::Guid;
pub use size::{gb, kb, mb, LARGE_PAGE_SIZE, NON_OS_MEMORY_LIMIT, NON_OS_SIZE_LIMIT, ONE_GB_PAGE_SIZE, PAGE_SIZE};
