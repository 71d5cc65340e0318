//! Pipeline configuration
//!
//! A [`PipelineConfig`] is passed explicitly to every fit, save and load
//! call. Nothing in the workspace reads process-wide settings, so pipelines
//! with different configurations can run side by side.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for fitting, persisting and loading models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for every random choice made during fitting
    pub seed: u64,

    /// Number of rows pulled from a source per batch
    pub batch_size: usize,

    /// Number of worker threads used inside trainers
    pub worker_threads: usize,

    /// Whether to verify artifact checksums when loading a model and after saving one
    pub verify_checksum: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            batch_size: 1024,
            worker_threads: num_cpus::get(),
            verify_checksum: true,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::InvalidArgument(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Build a thread pool sized by `worker_threads`
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads.max(1))
            .build()
            .map_err(|e| Error::InvalidArgument(format!("cannot build thread pool: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "seed": 42, "worker_threads": 2 }}"#).unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.batch_size, 1024);
        assert!(config.verify_checksum);
    }

    #[test]
    fn test_missing_file() {
        let result = PipelineConfig::from_json_file("/definitely/not/here.json");
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
