//! CSV dataset implementation

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::csv::{ReaderBuilder, StringRecord};
use ml_fit_core::{Dataset, Error, RecordBatch, RecordBatchSource, Result, Schema};
use tracing::{debug, info};

use super::parser::CsvParser;

/// Options for CSV reader
#[derive(Debug, Clone)]
pub struct CsvReaderOptions {
    /// Whether the file has a header row
    pub has_header: bool,

    /// Delimiter character
    pub delimiter: u8,

    /// Whether quoted fields are recognized
    pub quoting: bool,

    /// Quote character
    pub quote: u8,

    /// Whether to trim whitespace around fields
    pub trim: bool,

    /// Source field index for each schema column, when the file has more
    /// fields than the schema or a different order
    pub columns: Option<Vec<usize>>,
}

impl Default for CsvReaderOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            quoting: true,
            quote: b'"',
            trim: false,
            columns: None,
        }
    }
}

impl CsvReaderOptions {
    /// Tab-separated options without quote handling
    pub fn tsv(has_header: bool) -> Self {
        Self {
            has_header,
            delimiter: b'\t',
            quoting: false,
            ..Self::default()
        }
    }
}

/// A delimited text file bound to a column specification.
///
/// Each [`Dataset::scan`] reopens the file and reads it from the start.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    /// Path to the file
    path: PathBuf,

    /// Reader options
    options: CsvReaderOptions,

    /// Parser bound to the schema
    parser: CsvParser,

    /// Row count found by the validating pass
    row_count: usize,
}

impl CsvDataset {
    /// Load a delimited file.
    ///
    /// The whole file is read once to validate every row, so a malformed row
    /// fails the load instead of surfacing halfway through training.
    pub fn load<P: AsRef<Path>>(path: P, options: CsvReaderOptions, schema: Schema) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(Error::NotFound { path });
        }

        let parser = CsvParser::new(Arc::new(schema), options.columns.clone(), &path)?;
        let mut dataset = Self {
            path,
            options,
            parser,
            row_count: 0,
        };

        let mut scanner = dataset.open()?;
        let mut row_count = 0;
        while let Some(batch) = scanner.next_batch(4096)? {
            row_count += batch.row_count();
        }
        dataset.row_count = row_count;

        info!(path = %dataset.path.display(), rows = row_count, "Loaded delimited file");
        Ok(dataset)
    }

    /// Get the path to the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the reader options
    pub fn options(&self) -> &CsvReaderOptions {
        &self.options
    }

    fn open(&self) -> Result<CsvScanner<'_>> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                path: self.path.clone(),
            },
            _ => Error::Io(e),
        })?;

        let reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .quoting(self.options.quoting)
            .quote(self.options.quote)
            .has_headers(self.options.has_header)
            .trim(if self.options.trim {
                ::csv::Trim::All
            } else {
                ::csv::Trim::None
            })
            .flexible(true)
            .from_reader(file);

        debug!(path = %self.path.display(), "Opened delimited file");

        Ok(CsvScanner {
            dataset: self,
            reader,
            record: StringRecord::new(),
        })
    }
}

impl Dataset for CsvDataset {
    fn schema(&self) -> Arc<Schema> {
        self.parser.schema().clone()
    }

    fn row_count(&self) -> Option<usize> {
        Some(self.row_count)
    }

    fn scan(&self) -> Result<Box<dyn RecordBatchSource + '_>> {
        Ok(Box::new(self.open()?))
    }
}

/// One pass over a delimited file
struct CsvScanner<'a> {
    dataset: &'a CsvDataset,
    reader: ::csv::Reader<File>,
    record: StringRecord,
}

impl RecordBatchSource for CsvScanner<'_> {
    fn schema(&self) -> Arc<Schema> {
        self.dataset.schema()
    }

    fn next_batch(&mut self, max_batch_size: usize) -> Result<Option<RecordBatch>> {
        let mut rows = Vec::with_capacity(max_batch_size.min(4096));

        while rows.len() < max_batch_size.max(1) {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| self.map_csv_error(e))?;
            if !more {
                break;
            }

            // Blank lines carry no fields and are not rows
            if self.record.len() == 1 && self.record.get(0).is_some_and(str::is_empty) {
                continue;
            }

            let line = self.record.position().map_or(0, |p| p.line());
            rows.push(self.dataset.parser.parse_record(&self.record, line)?);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(RecordBatch::new_unchecked(self.schema(), rows)))
    }
}

impl CsvScanner<'_> {
    fn map_csv_error(&self, error: ::csv::Error) -> Error {
        let line = error.position().map_or(0, |p| p.line());
        match error.into_kind() {
            ::csv::ErrorKind::Io(e) => Error::Io(e),
            other => Error::Format {
                path: self.dataset.path.clone(),
                line,
                message: format!("{:?}", other),
            },
        }
    }
}
