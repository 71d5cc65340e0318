//! Conversions between categorical values and keys

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vocabulary::{KeyOrdering, Vocabulary};

/// Specification of a value-to-key mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValueToKey {
    /// Column holding the raw values
    pub input: String,

    /// Column receiving the keys
    pub output: String,

    /// Key assignment order
    pub ordering: KeyOrdering,

    /// Maximum vocabulary size
    pub max_keys: Option<usize>,
}

impl MapValueToKey {
    /// Map `input` into keys stored in `output`
    pub fn new(output: &str, input: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
            ordering: KeyOrdering::ByOccurrence,
            max_keys: None,
        }
    }

    /// Use a different key ordering
    pub fn with_ordering(mut self, ordering: KeyOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Cap the vocabulary size
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    pub(crate) fn check_input(&self, schema: &Schema) -> Result<()> {
        schema.require(&self.input, DataType::is_scalar)?;
        Ok(())
    }

    /// Build the vocabulary over the training data
    pub fn fit(&self, data: &dyn Dataset, batch_size: usize) -> Result<ValueToKeyTransform> {
        self.check_input(&data.schema())?;
        let vocabulary = Vocabulary::fit(data, &self.input, self.ordering, self.max_keys, batch_size)?;
        debug!(input = %self.input, output = %self.output, keys = vocabulary.len(), "Fitted value-to-key mapping");

        Ok(ValueToKeyTransform {
            input: self.input.clone(),
            output: self.output.clone(),
            vocabulary,
        })
    }
}

/// Fitted value-to-key mapping with a frozen vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueToKeyTransform {
    input: String,
    output: String,
    vocabulary: Vocabulary,
}

impl ValueToKeyTransform {
    /// Get the vocabulary captured at fit time
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

impl RowTransform for ValueToKeyTransform {
    fn name(&self) -> &'static str {
        "MapValueToKey"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        input_schema.require(&self.input, DataType::is_scalar)?;
        let field = Field::key_with_values(&self.output, self.vocabulary.values().to_vec());
        Ok(input_schema.with_field(field).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let index = input_schema.index_of(&self.input)?;
        let key = row.get(index).map_or(0, |value| self.vocabulary.key_of(value));
        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, Value::Key(key))?;
        Ok(row)
    }
}

/// Specification of a key-to-value mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapKeyToValue {
    /// Key column
    pub input: String,

    /// Column receiving the original values
    pub output: String,
}

impl MapKeyToValue {
    /// Map keys in `input` back to their values in `output`
    pub fn new(output: &str, input: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
        }
    }

    pub(crate) fn key_values<'a>(&self, schema: &'a Schema) -> Result<&'a [String]> {
        let (_, field) = schema.require(&self.input, |t| matches!(t, DataType::Key(_)))?;
        field
            .key_values()
            .ok_or_else(|| Error::schema(&self.input, "key column carries no key values"))
    }

    /// Capture the key values of the input column
    pub fn fit(&self, data: &dyn Dataset) -> Result<KeyToValueTransform> {
        let schema = data.schema();
        let values = self.key_values(&schema)?.to_vec();

        Ok(KeyToValueTransform {
            input: self.input.clone(),
            output: self.output.clone(),
            values,
        })
    }
}

/// Fitted key-to-value mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyToValueTransform {
    input: String,
    output: String,
    values: Vec<String>,
}

impl RowTransform for KeyToValueTransform {
    fn name(&self) -> &'static str {
        "MapKeyToValue"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        input_schema.require(&self.input, |t| matches!(t, DataType::Key(_)))?;
        Ok(input_schema.with_field(Field::new(&self.output, DataType::String)).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let index = input_schema.index_of(&self.input)?;
        let value = match row.get(index) {
            Some(Value::Key(key)) => (*key as usize)
                .checked_sub(1)
                .and_then(|i| self.values.get(i))
                .cloned()
                .unwrap_or_default(),
            other => {
                return Err(Error::schema(
                    &self.input,
                    format!("expected key value, found {:?}", other),
                ))
            }
        };
        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, Value::String(value))?;
        Ok(row)
    }
}
