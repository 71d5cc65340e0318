//! Typed record views over rows
//!
//! Input records implement [`Record`] so they can be wrapped as datasets or
//! scored one at a time. Prediction records implement [`FromRow`] and are
//! read back out of a scored row by column name, so a prediction type only
//! names the input and derived columns it cares about.

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::{Row, Value};

/// A typed input record with a fixed schema
pub trait Record: Send + Sync {
    /// Schema shared by all records of this type
    fn schema() -> Schema
    where
        Self: Sized;

    /// Convert this record into a row matching [`Record::schema`]
    fn to_row(&self) -> Row;
}

/// A typed output record read from a scored row
pub trait FromRow: Sized {
    /// Build the record from a row and its schema
    fn from_row(view: &RowView<'_>) -> Result<Self>;
}

/// Read-only accessor for a row by column name
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    schema: &'a Schema,
    row: &'a Row,
}

impl<'a> RowView<'a> {
    /// Create a view of `row` under `schema`
    pub fn new(schema: &'a Schema, row: &'a Row) -> Self {
        Self { schema, row }
    }

    /// Get the schema of the viewed row
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Get a value by column name
    pub fn get(&self, name: &str) -> Result<&'a Value> {
        let index = self.schema.index_of(name)?;
        self.row
            .get(index)
            .ok_or_else(|| Error::schema(name, "row is shorter than its schema"))
    }

    /// Get a float column
    pub fn float(&self, name: &str) -> Result<f32> {
        match self.get(name)? {
            Value::Float(v) => Ok(*v),
            other => Err(wrong_type(name, "Float", other)),
        }
    }

    /// Get an integer column
    pub fn int(&self, name: &str) -> Result<i64> {
        match self.get(name)? {
            Value::Int(v) => Ok(*v),
            other => Err(wrong_type(name, "Int", other)),
        }
    }

    /// Get a boolean column
    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            Value::Bool(v) => Ok(*v),
            other => Err(wrong_type(name, "Bool", other)),
        }
    }

    /// Get a string column
    pub fn string(&self, name: &str) -> Result<&'a str> {
        match self.get(name)? {
            Value::String(v) => Ok(v.as_str()),
            other => Err(wrong_type(name, "String", other)),
        }
    }

    /// Get a key column
    pub fn key(&self, name: &str) -> Result<u32> {
        match self.get(name)? {
            Value::Key(v) => Ok(*v),
            other => Err(wrong_type(name, "Key", other)),
        }
    }

    /// Get a vector column
    pub fn vector(&self, name: &str) -> Result<&'a [f32]> {
        match self.get(name)? {
            Value::Vector(v) => Ok(v.as_slice()),
            other => Err(wrong_type(name, "Vector", other)),
        }
    }
}

fn wrong_type(name: &str, expected: &str, found: &Value) -> Error {
    Error::schema(name, format!("expected {} value, found {:?}", expected, found))
}
