//! The five sample tasks

pub mod iris;
pub mod issues;
pub mod movies;
pub mod sentiment;
pub mod taxi;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ml_fit_model::{Model, ModelStore, PipelineConfig};
use tracing::info;

/// Save `model` to `path` and read it back, as a consumer of the artifact would
pub(crate) fn save_and_reload(model: &Model, path: &Path, config: &PipelineConfig) -> anyhow::Result<Arc<Model>> {
    ModelStore::save(model, path, config).with_context(|| format!("saving model to {}", path.display()))?;
    let (loaded, schema) =
        ModelStore::load(path, config).with_context(|| format!("loading model from {}", path.display()))?;
    info!(model_id = %loaded.id(), columns = schema.len(), "Reloaded model");
    Ok(Arc::new(loaded))
}

/// Horizontal rule used by task reports
pub(crate) const RULE: &str =
    "*************************************************************************************************************";
