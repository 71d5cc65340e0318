//! One-hot encoding of categorical columns

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Field, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vocabulary::{KeyOrdering, Vocabulary};

/// Specification of a one-hot encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoding {
    /// Categorical column
    pub input: String,

    /// Vector column receiving the indicator
    pub output: String,

    /// Maximum vocabulary size
    pub max_keys: Option<usize>,
}

impl OneHotEncoding {
    /// Encode `input` into an indicator vector stored in `output`
    pub fn new(output: &str, input: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
            max_keys: None,
        }
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

    /// Build the category vocabulary over the training data
    pub fn fit(&self, data: &dyn Dataset, batch_size: usize) -> Result<OneHotTransform> {
        self.check_input(&data.schema())?;
        let vocabulary = Vocabulary::fit(
            data,
            &self.input,
            KeyOrdering::ByOccurrence,
            self.max_keys,
            batch_size,
        )?;
        debug!(input = %self.input, categories = vocabulary.len(), "Fitted one-hot encoding");

        Ok(OneHotTransform {
            input: self.input.clone(),
            output: self.output.clone(),
            vocabulary,
        })
    }
}

/// Fitted one-hot encoder.
///
/// The output has one slot per category plus slot `0`, which is set for
/// values not seen during fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotTransform {
    input: String,
    output: String,
    vocabulary: Vocabulary,
}

impl OneHotTransform {
    /// Length of the indicator vector
    pub fn dimension(&self) -> usize {
        self.vocabulary.len() + 1
    }

    /// Get the vocabulary captured at fit time
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

impl RowTransform for OneHotTransform {
    fn name(&self) -> &'static str {
        "OneHotEncoding"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        input_schema.require(&self.input, DataType::is_scalar)?;
        let field = Field::new(&self.output, DataType::Vector(self.dimension()));
        Ok(input_schema.with_field(field).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let index = input_schema.index_of(&self.input)?;
        let key = row.get(index).map_or(0, |value| self.vocabulary.key_of(value));

        let mut indicator = vec![0.0; self.dimension()];
        indicator[key as usize] = 1.0;

        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, Value::Vector(indicator))?;
        Ok(row)
    }
}
