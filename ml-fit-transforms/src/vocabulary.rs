//! Fit-time vocabularies for categorical columns

use std::collections::HashMap;

use ml_fit_core::{for_each_row, Dataset, Result, Value};
use serde::{Deserialize, Serialize};

/// Order in which vocabulary keys are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyOrdering {
    /// Keys follow the order values are first seen
    #[default]
    ByOccurrence,

    /// Keys follow the lexical order of the values
    ByValue,
}

/// Dictionary mapping categorical values to 1-based keys.
///
/// Key `0` is never assigned; lookups of unknown values return `0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    /// Mapping from values to keys
    value_to_key: HashMap<String, u32>,

    /// Values in key order
    key_to_value: Vec<String>,
}

impl From<Vec<String>> for Vocabulary {
    fn from(values: Vec<String>) -> Self {
        let mut vocabulary = Self::new();
        for value in &values {
            vocabulary.get_or_insert(value);
        }
        vocabulary
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocabulary: Vocabulary) -> Self {
        vocabulary.key_to_value
    }
}

impl Vocabulary {
    /// Create a new empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vocabulary over one column of a dataset.
    ///
    /// Empty strings and NaN floats are treated as missing and never get a
    /// key. With `max_keys`, values beyond the cap are left out and will map
    /// to the missing key.
    pub fn fit(
        data: &dyn Dataset,
        column: &str,
        ordering: KeyOrdering,
        max_keys: Option<usize>,
        batch_size: usize,
    ) -> Result<Self> {
        let index = data.schema().index_of(column)?;
        let mut vocabulary = Self::new();

        for_each_row(data, batch_size, |row| {
            if let Some(value) = row.get(index) {
                let full = max_keys.is_some_and(|max| vocabulary.len() >= max);
                if !is_missing(value) && !full {
                    vocabulary.get_or_insert(&value.to_key_string());
                }
            }
            Ok(())
        })?;

        if ordering == KeyOrdering::ByValue {
            let mut values = vocabulary.key_to_value;
            values.sort();
            vocabulary = Self::from(values);
        }

        Ok(vocabulary)
    }

    /// Get or insert a value, returning its key
    pub fn get_or_insert(&mut self, value: &str) -> u32 {
        if let Some(&key) = self.value_to_key.get(value) {
            key
        } else {
            self.key_to_value.push(value.to_string());
            let key = self.key_to_value.len() as u32;
            self.value_to_key.insert(value.to_string(), key);
            key
        }
    }

    /// Get the key for a value, `0` if unknown
    pub fn key_of(&self, value: &Value) -> u32 {
        if is_missing(value) {
            return 0;
        }
        self.value_to_key
            .get(&value.to_key_string())
            .copied()
            .unwrap_or(0)
    }

    /// Get the value for a key
    pub fn value(&self, key: u32) -> Option<&str> {
        let index = (key as usize).checked_sub(1)?;
        self.key_to_value.get(index).map(String::as_str)
    }

    /// Get all values in key order
    pub fn values(&self) -> &[String] {
        &self.key_to_value
    }

    /// Get the number of entries in the vocabulary
    pub fn len(&self) -> usize {
        self.key_to_value.len()
    }

    /// Check if the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.key_to_value.is_empty()
    }
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Float(v) => v.is_nan(),
        Value::Key(k) => *k == 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_start_at_one() {
        let mut vocabulary = Vocabulary::new();
        assert_eq!(vocabulary.get_or_insert("area-System.Net"), 1);
        assert_eq!(vocabulary.get_or_insert("area-Infrastructure"), 2);
        assert_eq!(vocabulary.get_or_insert("area-System.Net"), 1);
        assert_eq!(vocabulary.value(2), Some("area-Infrastructure"));
        assert_eq!(vocabulary.value(0), None);
    }

    #[test]
    fn test_unknown_and_missing_map_to_zero() {
        let vocabulary = Vocabulary::from(vec!["a".to_string()]);
        assert_eq!(vocabulary.key_of(&Value::from("a")), 1);
        assert_eq!(vocabulary.key_of(&Value::from("b")), 0);
        assert_eq!(vocabulary.key_of(&Value::from("")), 0);
    }
}
