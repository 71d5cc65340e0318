//! Schema definition for tabular ML data

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Data type for column values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit floating point
    Float,

    /// 64-bit signed integer
    Int,

    /// UTF-8 encoded string
    String,

    /// Boolean
    Bool,

    /// Categorical key with the given number of known values.
    ///
    /// Key `0` is reserved for missing or unseen values; known values are
    /// numbered from `1` to the cardinality.
    Key(u32),

    /// Dense vector of 32-bit floats with a fixed length
    Vector(usize),
}

impl DataType {
    /// Number of feature slots this type contributes when concatenated,
    /// or `None` if it cannot be used as a numeric feature
    pub fn feature_slots(&self) -> Option<usize> {
        match self {
            DataType::Float | DataType::Int | DataType::Bool => Some(1),
            DataType::Vector(len) => Some(*len),
            DataType::String | DataType::Key(_) => None,
        }
    }

    /// Check if this is a scalar (non-vector) type
    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Vector(_))
    }

    /// Check if this type is a numeric scalar
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Float | DataType::Int)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float => write!(f, "Float"),
            DataType::Int => write!(f, "Int"),
            DataType::String => write!(f, "String"),
            DataType::Bool => write!(f, "Bool"),
            DataType::Key(cardinality) => write!(f, "Key({})", cardinality),
            DataType::Vector(len) => write!(f, "Vector({})", len),
        }
    }
}

/// A named, typed column in a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Data type of the field
    pub data_type: DataType,

    /// Original values of a key column, in key order (key `k` is `key_values[k - 1]`)
    pub key_values: Option<Vec<String>>,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            key_values: None,
        }
    }

    /// Create a key field whose cardinality is the number of values
    pub fn key_with_values(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            data_type: DataType::Key(values.len() as u32),
            key_values: Some(values),
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Get the key values of this field, if it is an annotated key column
    pub fn key_values(&self) -> Option<&[String]> {
        self.key_values.as_deref()
    }

    /// Copy of this field under another name
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)
    }
}

/// An ordered set of uniquely named fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaFields")]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    #[serde(skip)]
    field_indices: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct SchemaFields {
    fields: Vec<Field>,
}

impl TryFrom<SchemaFields> for Schema {
    type Error = Error;

    fn try_from(repr: SchemaFields) -> Result<Self> {
        Self::try_new(repr.fields)
    }
}

fn index_fields(fields: &[Field]) -> HashMap<String, usize> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| (field.name.clone(), i))
        .collect()
}

impl Schema {
    /// Create a new schema with the given fields
    ///
    /// # Panics
    ///
    /// Panics if two fields share a name. Use [`Schema::try_new`] for
    /// schemas built from untrusted input.
    pub fn new(fields: Vec<Field>) -> Self {
        match Self::try_new(fields) {
            Ok(schema) => schema,
            Err(e) => panic!("{}", e),
        }
    }

    /// Create a new schema, rejecting duplicate field names
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let field_indices = index_fields(&fields);
        if field_indices.len() != fields.len() {
            let duplicate = fields
                .iter()
                .enumerate()
                .find(|(i, f)| field_indices.get(&f.name) != Some(i))
                .map(|(_, f)| f.name.clone())
                .unwrap_or_default();
            return Err(Error::schema(duplicate, "duplicate column name"));
        }

        Ok(Self {
            fields,
            field_indices,
        })
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.find(name)
            .ok_or_else(|| Error::schema(name, "column not found"))
    }

    /// Get the index of a field by name, if present
    pub fn find(&self, name: &str) -> Option<usize> {
        self.field_indices.get(name).copied()
    }

    /// Resolve a column that must have one of the accepted types
    pub fn require(&self, name: &str, accepts: impl Fn(&DataType) -> bool) -> Result<(usize, &Field)> {
        let index = self.index_of(name)?;
        let field = &self.fields[index];
        if !accepts(&field.data_type) {
            return Err(Error::schema(
                name,
                format!("unsupported column type {}", field.data_type),
            ));
        }
        Ok((index, field))
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Derive a schema with `field` added.
    ///
    /// A field whose name already exists replaces that column in place;
    /// otherwise it is appended. Returns the new schema and the slot the
    /// field occupies.
    pub fn with_field(&self, field: Field) -> (Arc<Schema>, usize) {
        let mut fields = self.fields.clone();
        let slot = match self.find(&field.name) {
            Some(index) => {
                fields[index] = field;
                index
            }
            None => {
                fields.push(field);
                fields.len() - 1
            }
        };

        let field_indices = index_fields(&fields);
        (Arc::new(Self { fields, field_indices }), slot)
    }

    /// Create a projection of this schema with only the specified field names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|&name| self.field_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iris_schema() -> Schema {
        Schema::new(vec![
            Field::new("SepalLength", DataType::Float),
            Field::new("SepalWidth", DataType::Float),
            Field::new("FlowerType", DataType::String),
        ])
    }

    #[test]
    fn test_lookup_by_name() {
        let schema = iris_schema();
        assert_eq!(schema.index_of("SepalWidth").unwrap(), 1);
        assert!(matches!(
            schema.index_of("PetalWidth"),
            Err(Error::Schema { column, .. }) if column == "PetalWidth"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Schema::try_new(vec![
            Field::new("a", DataType::Float),
            Field::new("a", DataType::Int),
        ]);
        assert!(matches!(result, Err(Error::Schema { column, .. }) if column == "a"));
    }

    #[test]
    fn test_with_field_appends_or_replaces() {
        let schema = iris_schema();

        let (appended, slot) = schema.with_field(Field::new("Features", DataType::Vector(2)));
        assert_eq!(slot, 3);
        assert_eq!(appended.len(), 4);
        assert_eq!(appended.field(0).name(), "SepalLength");

        let (replaced, slot) = schema.with_field(Field::new("FlowerType", DataType::Key(3)));
        assert_eq!(slot, 2);
        assert_eq!(replaced.len(), 3);
        assert_eq!(replaced.field(2).data_type(), &DataType::Key(3));
    }

    #[test]
    fn test_require_checks_type() {
        let schema = iris_schema();
        assert!(schema.require("SepalLength", DataType::is_numeric).is_ok());
        assert!(schema.require("FlowerType", DataType::is_numeric).is_err());
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let schema = iris_schema();
        let bytes = bincode::serialize(&schema).unwrap();
        let decoded: Schema = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, schema);
        assert_eq!(decoded.index_of("FlowerType").unwrap(), 2);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_names() {
        #[derive(Serialize)]
        struct RawSchema {
            fields: Vec<Field>,
        }

        let raw = RawSchema {
            fields: vec![Field::new("a", DataType::Float), Field::new("a", DataType::Int)],
        };
        let bytes = bincode::serialize(&raw).unwrap();
        assert!(bincode::deserialize::<Schema>(&bytes).is_err());
    }
}
