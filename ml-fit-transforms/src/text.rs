//! Free-text featurization by n-gram hashing
//!
//! Text is lowercased, split into Unicode words, and expanded into word
//! n-grams and character n-grams. Each n-gram is hashed into a fixed number
//! of buckets and the resulting count vector is L2-normalized. Hashing needs
//! no vocabulary, so the fitted stage is just the frozen options.

use std::sync::Arc;

use ml_fit_core::{output_slots, DataType, Dataset, Error, Field, Result, Row, RowTransform, Schema, Value};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Options for text featurization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFeaturizerOptions {
    /// Number of hash bits; the output has `2^hash_bits` slots
    pub hash_bits: u32,

    /// Longest word n-gram (1 = unigrams only)
    pub word_ngram_length: usize,

    /// Character n-gram length, or `None` to skip character n-grams
    pub char_ngram_length: Option<usize>,

    /// Whether to L2-normalize the output vector
    pub normalize: bool,
}

impl Default for TextFeaturizerOptions {
    fn default() -> Self {
        Self {
            hash_bits: 10,
            word_ngram_length: 2,
            char_ngram_length: Some(3),
            normalize: true,
        }
    }
}

impl TextFeaturizerOptions {
    /// Number of output slots
    pub fn dimension(&self) -> usize {
        1usize << self.hash_bits
    }
}

/// Specification of a text featurizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturizeText {
    /// Text column
    pub input: String,

    /// Vector column receiving the features
    pub output: String,

    /// Featurization options
    pub options: TextFeaturizerOptions,
}

impl FeaturizeText {
    /// Featurize `input` into `output` with default options
    pub fn new(output: &str, input: &str) -> Self {
        Self {
            input: input.to_string(),
            output: output.to_string(),
            options: TextFeaturizerOptions::default(),
        }
    }

    /// Use custom options
    pub fn with_options(mut self, options: TextFeaturizerOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn check_input(&self, schema: &Schema) -> Result<()> {
        schema.require(&self.input, |t| *t == DataType::String)?;
        if !(1..=24).contains(&self.options.hash_bits) {
            return Err(Error::InvalidArgument(format!(
                "hash_bits must be between 1 and 24, got {}",
                self.options.hash_bits
            )));
        }
        Ok(())
    }

    /// Freeze the options after checking the input column
    pub fn fit(&self, data: &dyn Dataset) -> Result<TextTransform> {
        self.check_input(&data.schema())?;
        Ok(TextTransform {
            input: self.input.clone(),
            output: self.output.clone(),
            options: self.options,
        })
    }
}

/// Fitted text featurizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextTransform {
    input: String,
    output: String,
    options: TextFeaturizerOptions,
}

impl TextTransform {
    /// Featurize one piece of text
    pub fn featurize(&self, text: &str) -> Vec<f32> {
        featurize(text, &self.options)
    }
}

impl RowTransform for TextTransform {
    fn name(&self) -> &'static str {
        "FeaturizeText"
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        input_schema.require(&self.input, |t| *t == DataType::String)?;
        let field = Field::new(&self.output, DataType::Vector(self.options.dimension()));
        Ok(input_schema.with_field(field).0)
    }

    fn transform_row(&self, input_schema: &Schema, mut row: Row) -> Result<Row> {
        let index = input_schema.index_of(&self.input)?;
        let features = match row.get(index) {
            Some(Value::String(text)) => self.featurize(text),
            other => {
                return Err(Error::schema(
                    &self.input,
                    format!("expected text value, found {:?}", other),
                ))
            }
        };
        let slot = output_slots(input_schema, &[&self.output])[0];
        row.put(slot, Value::Vector(features))?;
        Ok(row)
    }
}

fn bucket(kind: u8, gram: &str, mask: usize) -> usize {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind]);
    hasher.update(gram.as_bytes());
    (hasher.finalize() as usize) & mask
}

/// Hash the n-grams of `text` into a count vector
pub fn featurize(text: &str, options: &TextFeaturizerOptions) -> Vec<f32> {
    let dimension = options.dimension();
    let mask = dimension - 1;
    let mut counts = vec![0.0f32; dimension];

    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.unicode_words().collect();

    for n in 1..=options.word_ngram_length.max(1) {
        for gram in words.windows(n) {
            counts[bucket(b'w', &gram.join(" "), mask)] += 1.0;
        }
    }

    if let Some(n) = options.char_ngram_length.filter(|&n| n > 0) {
        let joined = words.join(" ");
        let chars: Vec<char> = joined.chars().collect();
        for gram in chars.windows(n) {
            let gram: String = gram.iter().collect();
            counts[bucket(b'c', &gram, mask)] += 1.0;
        }
    }

    if options.normalize {
        let norm = counts.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            counts.iter_mut().for_each(|v| *v /= norm);
        }
    }

    counts
}
