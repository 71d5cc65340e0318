//! Record batch: a run of rows sharing one schema

use std::sync::Arc;

use crate::error::Result;
use crate::schema::Schema;
use crate::value::{Row, Value};

/// A collection of rows bound to a schema
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    /// Schema describing the data
    schema: Arc<Schema>,

    /// Rows in this batch
    rows: Vec<Row>,
}

impl RecordBatch {
    /// Create a new record batch, checking every row against the schema
    pub fn new(schema: Arc<Schema>, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            row.validate(&schema)?;
        }
        Ok(Self { schema, rows })
    }

    /// Create a record batch from rows already known to match the schema
    pub fn new_unchecked(schema: Arc<Schema>, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Create a new empty record batch with the given schema
    pub fn empty(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Get the schema of this batch
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of rows in this batch
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if this batch is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get all rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the batch, returning its rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Get the values of one column by name
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>> {
        let index = self.schema.index_of(name)?;
        Ok(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }
}
