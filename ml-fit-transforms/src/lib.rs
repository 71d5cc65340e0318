//! Column transform stages for ML pipelines
//!
//! Every stage comes in two forms: a specification naming its input and
//! output columns, and the fitted stage it produces once fit-phase state
//! (vocabularies, frozen options) has been captured from training data.
//! Fitted stages implement [`RowTransform`] and are serializable so they can
//! be stored inside a model artifact.

#![warn(missing_docs)]

pub mod categorical;
pub mod column;
pub mod key;
pub mod text;
pub mod vocabulary;

use std::sync::Arc;

use ml_fit_core::{DataType, Dataset, Field, Result, Row, RowTransform, Schema};
use serde::{Deserialize, Serialize};

pub use categorical::{OneHotEncoding, OneHotTransform};
pub use column::{CacheCheckpoint, Concatenate, CopyColumn};
pub use key::{KeyToValueTransform, MapKeyToValue, MapValueToKey, ValueToKeyTransform};
pub use text::{FeaturizeText, TextFeaturizerOptions, TextTransform};
pub use vocabulary::{KeyOrdering, Vocabulary};

/// Specification of a transform stage, before fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageSpec {
    /// Categorical values to keys
    MapValueToKey(MapValueToKey),

    /// Keys back to their original values
    MapKeyToValue(MapKeyToValue),

    /// Free text to a hashed n-gram vector
    FeaturizeText(FeaturizeText),

    /// Categorical values to an indicator vector
    OneHotEncoding(OneHotEncoding),

    /// Numeric columns to one feature vector
    Concatenate(Concatenate),

    /// Column duplication under a new name
    CopyColumn(CopyColumn),

    /// Materialize rows in memory during fitting
    CacheCheckpoint,
}

impl StageSpec {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StageSpec::MapValueToKey(_) => "MapValueToKey",
            StageSpec::MapKeyToValue(_) => "MapKeyToValue",
            StageSpec::FeaturizeText(_) => "FeaturizeText",
            StageSpec::OneHotEncoding(_) => "OneHotEncoding",
            StageSpec::Concatenate(_) => "Concatenate",
            StageSpec::CopyColumn(_) => "CopyColumn",
            StageSpec::CacheCheckpoint => "CacheCheckpoint",
        }
    }

    /// Check if this stage is a cache checkpoint
    pub fn is_cache_checkpoint(&self) -> bool {
        matches!(self, StageSpec::CacheCheckpoint)
    }

    /// Fit the stage against `data`, capturing any fit-phase state
    pub fn fit(&self, data: &dyn Dataset, batch_size: usize) -> Result<FittedStage> {
        Ok(match self {
            StageSpec::MapValueToKey(spec) => FittedStage::ValueToKey(spec.fit(data, batch_size)?),
            StageSpec::MapKeyToValue(spec) => FittedStage::KeyToValue(spec.fit(data)?),
            StageSpec::FeaturizeText(spec) => FittedStage::Text(spec.fit(data)?),
            StageSpec::OneHotEncoding(spec) => FittedStage::OneHot(spec.fit(data, batch_size)?),
            StageSpec::Concatenate(spec) => {
                spec.output_schema(&data.schema())?;
                FittedStage::Concatenate(spec.clone())
            }
            StageSpec::CopyColumn(spec) => {
                spec.output_schema(&data.schema())?;
                FittedStage::CopyColumn(spec.clone())
            }
            StageSpec::CacheCheckpoint => FittedStage::CacheCheckpoint(CacheCheckpoint),
        })
    }

    /// Output schema without fitting.
    ///
    /// Outputs whose width depends on a fitted vocabulary are reported as if
    /// the vocabulary were empty, so a composition can be validated against
    /// an input schema before any data is read.
    pub fn plan_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        let field = match self {
            StageSpec::MapValueToKey(spec) => {
                spec.check_input(input_schema)?;
                Field::key_with_values(&spec.output, Vec::new())
            }
            StageSpec::OneHotEncoding(spec) => {
                spec.check_input(input_schema)?;
                Field::new(&spec.output, DataType::Vector(1))
            }
            StageSpec::MapKeyToValue(spec) => {
                spec.key_values(input_schema)?;
                Field::new(&spec.output, DataType::String)
            }
            StageSpec::FeaturizeText(spec) => {
                spec.check_input(input_schema)?;
                Field::new(&spec.output, DataType::Vector(spec.options.dimension()))
            }
            StageSpec::Concatenate(spec) => return spec.output_schema(input_schema),
            StageSpec::CopyColumn(spec) => return spec.output_schema(input_schema),
            StageSpec::CacheCheckpoint => return CacheCheckpoint.output_schema(input_schema),
        };
        Ok(input_schema.with_field(field).0)
    }
}

impl From<MapValueToKey> for StageSpec {
    fn from(spec: MapValueToKey) -> Self {
        StageSpec::MapValueToKey(spec)
    }
}

impl From<MapKeyToValue> for StageSpec {
    fn from(spec: MapKeyToValue) -> Self {
        StageSpec::MapKeyToValue(spec)
    }
}

impl From<FeaturizeText> for StageSpec {
    fn from(spec: FeaturizeText) -> Self {
        StageSpec::FeaturizeText(spec)
    }
}

impl From<OneHotEncoding> for StageSpec {
    fn from(spec: OneHotEncoding) -> Self {
        StageSpec::OneHotEncoding(spec)
    }
}

impl From<Concatenate> for StageSpec {
    fn from(spec: Concatenate) -> Self {
        StageSpec::Concatenate(spec)
    }
}

impl From<CopyColumn> for StageSpec {
    fn from(spec: CopyColumn) -> Self {
        StageSpec::CopyColumn(spec)
    }
}

impl From<CacheCheckpoint> for StageSpec {
    fn from(_: CacheCheckpoint) -> Self {
        StageSpec::CacheCheckpoint
    }
}

/// A fitted transform stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedStage {
    /// Fitted value-to-key mapping
    ValueToKey(ValueToKeyTransform),

    /// Fitted key-to-value mapping
    KeyToValue(KeyToValueTransform),

    /// Fitted text featurizer
    Text(TextTransform),

    /// Fitted one-hot encoder
    OneHot(OneHotTransform),

    /// Concatenation
    Concatenate(Concatenate),

    /// Column copy
    CopyColumn(CopyColumn),

    /// Cache checkpoint
    CacheCheckpoint(CacheCheckpoint),
}

impl FittedStage {
    fn inner(&self) -> &dyn RowTransform {
        match self {
            FittedStage::ValueToKey(t) => t,
            FittedStage::KeyToValue(t) => t,
            FittedStage::Text(t) => t,
            FittedStage::OneHot(t) => t,
            FittedStage::Concatenate(t) => t,
            FittedStage::CopyColumn(t) => t,
            FittedStage::CacheCheckpoint(t) => t,
        }
    }
}

impl RowTransform for FittedStage {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn output_schema(&self, input_schema: &Schema) -> Result<Arc<Schema>> {
        self.inner().output_schema(input_schema)
    }

    fn transform_row(&self, input_schema: &Schema, row: Row) -> Result<Row> {
        self.inner().transform_row(input_schema, row)
    }
}
