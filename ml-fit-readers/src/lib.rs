//! Data source implementations for ML pipelines
//!
//! This crate loads delimiter-separated text files into restartable
//! [`Dataset`](ml_fit_core::Dataset) implementations bound to a fixed column
//! specification.

#![warn(missing_docs)]

pub mod csv;

pub use crate::csv::{CsvDataset, CsvParser, CsvReaderOptions};

// Re-export core types
pub use ml_fit_core::{DataType, Dataset, Field, Schema};
