//! Row transform trait shared by fitted stages and trained models

use std::sync::Arc;

use crate::error::Result;
use crate::record_batch::RecordBatch;
use crate::schema::Schema;
use crate::value::Row;

/// A fitted, immutable column-level transformation.
///
/// Implementations hold only frozen parameters, so `transform_row` is a pure
/// function of those parameters and its input and may be called from many
/// threads at once.
pub trait RowTransform: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Get the output schema for this transform when applied to the given input schema
    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>>;

    /// Transform one row laid out according to `input_schema`
    fn transform_row(&self, input_schema: &Schema, row: Row) -> Result<Row>;

    /// Transform a record batch
    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch> {
        let output_schema = self.output_schema(batch.schema())?;
        let input_schema = batch.schema().clone();
        let rows = batch
            .into_rows()
            .into_iter()
            .map(|row| self.transform_row(&input_schema, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordBatch::new_unchecked(output_schema, rows))
    }
}

/// Resolve where each named output lands in a row laid out by `input_schema`.
///
/// Names already present replace their column; new names are appended in
/// order, mirroring [`Schema::with_field`].
pub fn output_slots(input_schema: &Schema, names: &[&str]) -> Vec<usize> {
    let mut next = input_schema.len();
    names
        .iter()
        .map(|name| {
            input_schema.find(name).unwrap_or_else(|| {
                let slot = next;
                next += 1;
                slot
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};

    #[test]
    fn test_output_slots() {
        let schema = Schema::new(vec![
            Field::new("Features", DataType::Vector(2)),
            Field::new("Score", DataType::Float),
        ]);
        assert_eq!(output_slots(&schema, &["Score", "PredictedLabel", "Probability"]), vec![1, 2, 3]);
    }
}
