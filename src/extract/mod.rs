//! Row extraction
//!
//! For each document root and each table, the engine selects the working
//! elements (every `for_each` match, or the root itself) and computes one
//! cleaned value per column. Lookups that find nothing resolve to `NULL`;
//! extraction itself never fails.

mod engine;
mod strategy;
mod value;

pub use engine::{DocumentContext, Row, RowExtractor};
pub use value::SqlValue;
