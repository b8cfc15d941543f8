/*!
Component E: page-table translation (VA -> PA) for the three supported paging
modes. See [`pagewalker`] for the actual bit-shift formulas.
*/

pub mod pagewalker;

pub use pagewalker::{translate, PagingMode};
