//! Stateless column stages: concatenation, copying and cache checkpoints

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Error, Field, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};

/// Concatenates numeric columns into one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concatenate {
    /// Vector column receiving the features
    pub output: String,

    /// Source columns, in output order
    pub inputs: Vec<String>,
}

impl Concatenate {
    /// Concatenate `inputs` into `output`
    pub fn new(output: &str, inputs: &[&str]) -> Self {
        Self {
            output: output.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Total vector length after checking every input
    fn dimension(&self, schema: &Schema) -> Result<usize> {
        if self.inputs.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "concatenation into {} has no inputs",
                self.output
            )));
        }

        let mut dimension = 0;
        for name in &self.inputs {
            let field = schema.field_by_name(name)?;
            let slots = field.data_type().feature_slots().ok_or_else(|| {
                Error::schema(
                    name,
                    format!("cannot concatenate a {} column", field.data_type()),
                )
            })?;
            dimension += slots;
        }
        Ok(dimension)
    }
}

impl RowTransform for Concatenate {
    fn name(&self) -> &'static str {
        "Concatenate"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let dimension = self.dimension(input_schema)?;
        let field = Field::new(&self.output, DataType::Vector(dimension));
        Ok(input_schema.with_field(field).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let mut features = Vec::new();
        for name in &self.inputs {
            let index = input_schema.index_of(name)?;
            let accepted = row
                .get(index)
                .is_some_and(|value| value.extend_features(&mut features));
            if !accepted {
                return Err(Error::schema(name, "value cannot be used as a feature"));
            }
        }

        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, Value::Vector(features))?;
        Ok(row)
    }
}

/// Copies a column under a new name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyColumn {
    /// Source column
    pub input: String,

    /// Destination column
    pub output: String,
}

impl CopyColumn {
    /// Copy `input` into `output`
    pub fn new(output: &str, input: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}

impl RowTransform for CopyColumn {
    fn name(&self) -> &'static str {
        "CopyColumn"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let field = input_schema.field_by_name(&self.input)?.renamed(&self.output);
        Ok(input_schema.with_field(field).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let index = input_schema.index_of(&self.input)?;
        let value = row
            .get(index)
            .cloned()
            .ok_or_else(|| Error::schema(&self.input, "row is shorter than its schema"))?;
        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, value)?;
        Ok(row)
    }
}

/// Marks the point where fitting materializes rows into memory.
///
/// Applying a checkpoint leaves rows untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCheckpoint;

impl RowTransform for CacheCheckpoint {
    fn name(&self) -> &'static str {
        "CacheCheckpoint"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        Ok(Arc::new(input_schema.clone()))
    }

    fn transform_row(&self, _input_schema: &Schema, row: Row) -> Result<Row> {
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn taxi_schema() -> Schema {
        Schema::new(vec![
            Field::new("VendorIdEncoded", DataType::Vector(2)),
            Field::new("PassengerCount", DataType::Float),
            Field::new("TripDistance", DataType::Float),
            Field::new("PaymentType", DataType::String),
            Field::new("FareAmount", DataType::Float),
        ])
    }

    fn taxi_row() -> Row {
        Row::new(vec![
            Value::Vector(vec![0.0, 1.0]),
            Value::Float(1.0),
            Value::Float(3.75),
            Value::from("CRD"),
            Value::Float(15.5),
        ])
    }

    #[test]
    fn test_concatenate_in_declared_order() {
        let stage = Concatenate::new("Features", &["TripDistance", "VendorIdEncoded", "PassengerCount"]);
        let schema = taxi_schema();

        let out_schema = stage.output_schema(&schema).unwrap();
        assert_eq!(out_schema.field_by_name("Features").unwrap().data_type(), &DataType::Vector(4));

        let row = stage.transform_row(&schema, taxi_row()).unwrap();
        assert_eq!(row.get(5), Some(&Value::Vector(vec![3.75, 0.0, 1.0, 1.0])));
    }

    #[test_case(&["PaymentType"], "PaymentType" ; "string input")]
    #[test_case(&["TripDistance", "TripTime"], "TripTime" ; "missing input")]
    fn test_concatenate_rejects(inputs: &[&str], column: &str) {
        let stage = Concatenate::new("Features", inputs);
        let result = stage.output_schema(&taxi_schema());
        assert!(matches!(result, Err(Error::Schema { column: c, .. }) if c == column));
    }

    #[test]
    fn test_copy_column() {
        let stage = CopyColumn::new("Label", "FareAmount");
        let schema = taxi_schema();
        let out_schema = stage.output_schema(&schema).unwrap();
        assert_eq!(out_schema.len(), 6);

        let row = stage.transform_row(&schema, taxi_row()).unwrap();
        assert_eq!(row.get(5), Some(&Value::Float(15.5)));
    }

    #[test]
    fn test_copy_keeps_key_values() {
        let schema = Schema::new(vec![Field::key_with_values("Label", vec!["a".into(), "b".into()])]);
        let out = CopyColumn::new("Expected", "Label").output_schema(&schema).unwrap();
        assert_eq!(out.field_by_name("Expected").unwrap().key_values().map(<[String]>::len), Some(2));
    }
}
