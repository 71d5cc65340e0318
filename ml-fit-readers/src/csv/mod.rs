//! Delimited text reader
//!
//! Loads comma-, tab- or otherwise-delimited files into a restartable
//! dataset with a fixed column specification. Loading validates every row up
//! front; malformed rows abort the load rather than being skipped.

mod parser;
mod reader;

pub use parser::CsvParser;
pub use reader::{CsvDataset, CsvReaderOptions};
