//! Core traits and data structures for typed ML pipelines
//!
//! This crate provides the foundational components the rest of the workspace
//! builds on: schemas, typed values and rows, restartable datasets, typed
//! record views, seeded train/test splits, the shared error type and the
//! explicit pipeline configuration.

#![warn(missing_docs)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod record;
pub mod record_batch;
pub mod schema;
pub mod split;
pub mod transform;
pub mod value;

// Re-export key types for convenience
pub use config::PipelineConfig;
pub use dataset::{collect_rows, for_each_row, Dataset, InMemoryDataset, RecordBatchSource};
pub use error::{Error, Result};
pub use record::{FromRow, Record, RowView};
pub use record_batch::RecordBatch;
pub use schema::{DataType, Field, Schema};
pub use split::{train_test_split, TrainTestSplit};
pub use transform::{output_slots, RowTransform};
pub use value::{Row, Value};
