//! Delimited text (CSV/TSV) source support

mod conversion;
mod reader;

pub use reader::GenericDelimitedReader;
