//! Dataset trait and in-memory implementation

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::record::Record;
use crate::record_batch::RecordBatch;
use crate::schema::Schema;
use crate::value::Row;

/// A single pass over the rows of a dataset
pub trait RecordBatchSource {
    /// Get the schema of the rows produced by this source
    fn schema(&self) -> Arc<Schema>;

    /// Retrieve the next batch of at most `max_batch_size` rows.
    /// Returns None when exhausted
    fn next_batch(&mut self, max_batch_size: usize) -> Result<Option<RecordBatch>>;
}

/// A finite, restartable collection of rows bound to a schema.
///
/// Every call to [`Dataset::scan`] starts a fresh pass from the origin, so a
/// dataset can be read once for fitting and again for evaluation.
pub trait Dataset: Send + Sync {
    /// Get the schema of this dataset
    fn schema(&self) -> Arc<Schema>;

    /// Get the number of rows in this dataset, if known without scanning
    fn row_count(&self) -> Option<usize>;

    /// Create a source for one pass over this dataset
    fn scan(&self) -> Result<Box<dyn RecordBatchSource + '_>>;
}

/// Read every row of a dataset into memory
pub fn collect_rows(dataset: &dyn Dataset, batch_size: usize) -> Result<Vec<Row>> {
    let mut source = dataset.scan()?;
    let mut rows = Vec::with_capacity(dataset.row_count().unwrap_or(0));
    while let Some(batch) = source.next_batch(batch_size.max(1))? {
        rows.extend(batch.into_rows());
    }
    Ok(rows)
}

/// Visit every row of a dataset in order, one batch at a time
pub fn for_each_row<F>(dataset: &dyn Dataset, batch_size: usize, mut visit: F) -> Result<()>
where
    F: FnMut(&Row) -> Result<()>,
{
    let mut source = dataset.scan()?;
    while let Some(batch) = source.next_batch(batch_size.max(1))? {
        for row in batch.rows() {
            visit(row)?;
        }
    }
    Ok(())
}

/// An in-memory dataset backed by a shared vector of rows
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    /// The schema of the dataset
    schema: Arc<Schema>,

    /// The cached rows
    rows: Arc<Vec<Row>>,
}

impl InMemoryDataset {
    /// Create a new in-memory dataset, validating every row against the schema
    pub fn new(schema: Arc<Schema>, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            row.validate(&schema)?;
        }
        Ok(Self::new_unchecked(schema, rows))
    }

    /// Create a new in-memory dataset from rows already known to match the schema
    pub fn new_unchecked(schema: Arc<Schema>, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows: Arc::new(rows),
        }
    }

    /// Wrap a collection of typed records without any I/O
    pub fn from_records<R: Record>(records: &[R]) -> Self {
        let schema = Arc::new(R::schema());
        let rows = records.iter().map(Record::to_row).collect();
        Self::new_unchecked(schema, rows)
    }

    /// Read every row of another dataset into memory
    pub fn materialize(dataset: &dyn Dataset, batch_size: usize) -> Result<Self> {
        let rows = collect_rows(dataset, batch_size)?;
        debug!(rows = rows.len(), "Materialized dataset");
        Ok(Self::new_unchecked(dataset.schema(), rows))
    }

    /// Get the rows in this dataset
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl Dataset for InMemoryDataset {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn row_count(&self) -> Option<usize> {
        Some(self.rows.len())
    }

    fn scan(&self) -> Result<Box<dyn RecordBatchSource + '_>> {
        Ok(Box::new(InMemoryDatasetScanner {
            schema: self.schema.clone(),
            rows: &self.rows,
            position: 0,
        }))
    }
}

/// A scanner over an in-memory dataset
struct InMemoryDatasetScanner<'a> {
    schema: Arc<Schema>,
    rows: &'a [Row],
    position: usize,
}

impl RecordBatchSource for InMemoryDatasetScanner<'_> {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self, max_batch_size: usize) -> Result<Option<RecordBatch>> {
        if self.position >= self.rows.len() {
            return Ok(None);
        }

        let end = (self.position + max_batch_size.max(1)).min(self.rows.len());
        let rows = self.rows[self.position..end].to_vec();
        self.position = end;

        Ok(Some(RecordBatch::new_unchecked(self.schema.clone(), rows)))
    }
}
