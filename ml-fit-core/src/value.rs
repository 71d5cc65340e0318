//! Cell values and rows

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 32-bit float
    Float(f32),

    /// 64-bit signed integer
    Int(i64),

    /// UTF-8 string
    String(String),

    /// Boolean
    Bool(bool),

    /// Categorical key, `0` meaning missing
    Key(u32),

    /// Dense float vector
    Vector(Vec<f32>),
}

impl Value {
    /// Check whether this value can be stored in a column of type `data_type`
    pub fn conforms_to(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Float(_), DataType::Float)
            | (Value::Int(_), DataType::Int)
            | (Value::String(_), DataType::String)
            | (Value::Bool(_), DataType::Bool) => true,
            (Value::Key(key), DataType::Key(cardinality)) => key <= cardinality,
            (Value::Vector(values), DataType::Vector(len)) => values.len() == *len,
            _ => false,
        }
    }

    /// Canonical string form used for vocabulary building
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Float(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::String(v) => v.clone(),
            Value::Bool(v) => v.to_string(),
            Value::Key(v) => v.to_string(),
            Value::Vector(values) => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Scalar numeric view of this value (bools are 0/1)
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f32),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Append this value's feature slots to `out`
    pub fn extend_features(&self, out: &mut Vec<f32>) -> bool {
        match self {
            Value::Vector(values) => {
                out.extend_from_slice(values);
                true
            }
            other => match other.as_f32() {
                Some(v) => {
                    out.push(v);
                    true
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Vector(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other.to_key_string()),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Vector(v)
    }
}

/// One row of values, ordered like the schema it belongs to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, returning its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Get the value at a column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of values in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store `value` at `slot`, appending when the slot is one past the end.
    ///
    /// Slots come from [`Schema::with_field`], so a slot is either an existing
    /// column being replaced or the next column being appended.
    pub fn put(&mut self, slot: usize, value: Value) -> Result<()> {
        match slot.cmp(&self.values.len()) {
            std::cmp::Ordering::Less => self.values[slot] = value,
            std::cmp::Ordering::Equal => self.values.push(value),
            std::cmp::Ordering::Greater => {
                return Err(Error::schema(
                    "<row>",
                    format!("cannot write slot {} of a row with {} values", slot, self.values.len()),
                ))
            }
        }
        Ok(())
    }

    /// Check that this row matches `schema` in arity and value types
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.values.len() != schema.len() {
            return Err(Error::schema(
                "<row>",
                format!(
                    "row has {} values, schema has {} columns",
                    self.values.len(),
                    schema.len()
                ),
            ));
        }

        for (value, field) in self.values.iter().zip(schema.fields()) {
            if !value.conforms_to(field.data_type()) {
                return Err(mismatch(field, value));
            }
        }

        Ok(())
    }
}

fn mismatch(field: &Field, value: &Value) -> Error {
    Error::schema(
        field.name(),
        format!("value {:?} does not conform to {}", value, field.data_type()),
    )
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Value::Float(1.5), DataType::Float, true ; "float")]
    #[test_case(Value::Int(3), DataType::Float, false ; "int is not float")]
    #[test_case(Value::Key(0), DataType::Key(2), true ; "missing key")]
    #[test_case(Value::Key(3), DataType::Key(2), false ; "key out of range")]
    #[test_case(Value::Vector(vec![1.0, 2.0]), DataType::Vector(2), true ; "vector length")]
    #[test_case(Value::Vector(vec![1.0]), DataType::Vector(2), false ; "vector short")]
    fn test_conforms_to(value: Value, data_type: DataType, expected: bool) {
        assert_eq!(value.conforms_to(&data_type), expected);
    }

    #[test]
    fn test_put_replaces_or_appends() {
        let mut row = Row::new(vec![Value::Float(1.0)]);
        row.put(0, Value::Float(2.0)).unwrap();
        row.put(1, Value::Bool(true)).unwrap();
        assert_eq!(row.values(), &[Value::Float(2.0), Value::Bool(true)]);
    }

    #[test]
    fn test_put_past_end_is_an_error() {
        let mut row = Row::new(vec![Value::Float(1.0)]);
        assert!(matches!(row.put(3, Value::Bool(true)), Err(Error::Schema { .. })));
        assert_eq!(row.values(), &[Value::Float(1.0)]);
    }

    #[test]
    fn test_validate_reports_column() {
        let schema = Schema::new(vec![
            Field::new("Title", DataType::String),
            Field::new("Score", DataType::Float),
        ]);
        let row = Row::new(vec![Value::from("x"), Value::from("y")]);
        assert!(matches!(row.validate(&schema), Err(Error::Schema { column, .. }) if column == "Score"));
    }
}
