//! Client directory: read-only table resolving company names, tax ids and
//! codes to canonical client codes.

mod static_table;
mod types;

pub use static_table::StaticDirectory;
pub use types::*;
