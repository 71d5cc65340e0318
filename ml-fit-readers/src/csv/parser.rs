//! CSV parser for converting string records to typed rows

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ml_fit_core::{DataType, Error, Field, Result, Row, Schema, Value};

/// Converts delimited string records into rows of a fixed schema
#[derive(Debug, Clone)]
pub struct CsvParser {
    /// Schema the rows must conform to
    schema: Arc<Schema>,

    /// Source field index for each schema column
    projection: Vec<usize>,

    /// Minimum number of fields a record must have
    min_fields: usize,

    /// Whether a record must have exactly `min_fields` fields
    exact: bool,

    /// File being parsed, for error reporting
    path: PathBuf,
}

impl CsvParser {
    /// Create a new parser.
    ///
    /// Without a projection the i-th field feeds the i-th column and records
    /// must have exactly as many fields as the schema. With a projection each
    /// column reads the given source field and extra fields are ignored.
    pub fn new(schema: Arc<Schema>, projection: Option<Vec<usize>>, path: &Path) -> Result<Self> {
        let (projection, exact) = match projection {
            Some(indices) => {
                if indices.len() != schema.len() {
                    return Err(Error::InvalidArgument(format!(
                        "projection has {} entries, schema has {} columns",
                        indices.len(),
                        schema.len()
                    )));
                }
                (indices, false)
            }
            None => ((0..schema.len()).collect(), true),
        };

        let min_fields = projection.iter().map(|&i| i + 1).max().unwrap_or(0);

        Ok(Self {
            schema,
            projection,
            min_fields,
            exact,
            path: path.to_path_buf(),
        })
    }

    /// Get the schema produced by this parser
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Parse one record located at `line`
    pub fn parse_record(&self, record: &::csv::StringRecord, line: u64) -> Result<Row> {
        let count = record.len();
        if count < self.min_fields || (self.exact && count != self.min_fields) {
            return Err(self.format_error(
                line,
                format!("record has {} fields, expected {}", count, self.min_fields),
            ));
        }

        let mut values = Vec::with_capacity(self.schema.len());
        for (field, &source) in self.schema.fields().iter().zip(&self.projection) {
            let raw = record.get(source).unwrap_or_default();
            values.push(self.parse_value(field, raw, line)?);
        }

        Ok(Row::new(values))
    }

    fn parse_value(&self, field: &Field, raw: &str, line: u64) -> Result<Value> {
        let text = raw.trim();
        let parsed = match field.data_type() {
            DataType::String => Some(Value::String(raw.to_string())),
            DataType::Float if text.is_empty() => Some(Value::Float(f32::NAN)),
            DataType::Float => text.parse::<f32>().ok().map(Value::Float),
            DataType::Int => text.parse::<i64>().ok().map(Value::Int),
            DataType::Bool => parse_bool(text).map(Value::Bool),
            DataType::Key(cardinality) => text
                .parse::<u32>()
                .ok()
                .filter(|key| key <= cardinality)
                .map(Value::Key),
            DataType::Vector(len) => {
                let parts: std::result::Result<Vec<f32>, _> =
                    text.split_whitespace().map(str::parse::<f32>).collect();
                parts.ok().filter(|v| v.len() == *len).map(Value::Vector)
            }
        };

        parsed.ok_or_else(|| {
            self.format_error(
                line,
                format!(
                    "cannot parse '{}' as {} for column '{}'",
                    raw,
                    field.data_type(),
                    field.name()
                ),
            )
        })
    }

    fn format_error(&self, line: u64, message: String) -> Error {
        Error::Format {
            path: self.path.clone(),
            line,
            message,
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::csv::StringRecord;
    use test_case::test_case;

    fn parser(projection: Option<Vec<usize>>) -> CsvParser {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Text", DataType::String),
            Field::new("Label", DataType::Bool),
        ]));
        CsvParser::new(schema, projection, Path::new("reviews.tsv")).unwrap()
    }

    #[test_case("1", true ; "one")]
    #[test_case("0", false ; "zero")]
    #[test_case("TRUE", true ; "upper true")]
    #[test_case("false", false ; "word false")]
    fn test_bool_forms(raw: &str, expected: bool) {
        let row = parser(None)
            .parse_record(&StringRecord::from(vec!["nice", raw]), 1)
            .unwrap();
        assert_eq!(row.get(1), Some(&Value::Bool(expected)));
    }

    #[test]
    fn test_wrong_field_count() {
        let err = parser(None)
            .parse_record(&StringRecord::from(vec!["a", "1", "extra"]), 7)
            .unwrap_err();
        assert!(matches!(err, Error::Format { line: 7, .. }));
    }

    #[test]
    fn test_projection_ignores_extra_fields() {
        let row = parser(Some(vec![2, 0]))
            .parse_record(&StringRecord::from(vec!["1", "ignored", "text"]), 1)
            .unwrap();
        assert_eq!(row.values(), &[Value::from("text"), Value::Bool(true)]);
    }

    #[test]
    fn test_bad_bool_is_format_error() {
        let err = parser(None)
            .parse_record(&StringRecord::from(vec!["a", "maybe"]), 3)
            .unwrap_err();
        assert!(matches!(err, Error::Format { line: 3, .. }));
    }
}
