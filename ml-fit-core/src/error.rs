//! Error types for ML pipelines

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for ML pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ML pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A data file or model artifact does not exist
    #[error("Not found: {}", path.display())]
    NotFound {
        /// Path that was requested
        path: PathBuf,
    },

    /// A row in a delimited file does not match the column specification
    #[error("Format error in {} at line {line}: {message}", path.display())]
    Format {
        /// File being read
        path: PathBuf,

        /// 1-based line number of the offending row
        line: u64,

        /// What was wrong with the row
        message: String,
    },

    /// A referenced column is absent or has an unexpected type
    #[error("Schema error on column '{column}': {message}")]
    Schema {
        /// Column that caused the error
        column: String,

        /// Description of the mismatch
        message: String,
    },

    /// A pipeline step failed while fitting or applying
    #[error("Stage {index} ({name}) failed: {source}")]
    Stage {
        /// Position of the step in the pipeline
        index: usize,

        /// Step name
        name: String,

        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// A model artifact is structurally invalid
    #[error("Corrupt model artifact: {0}")]
    CorruptArtifact(String),

    /// A model artifact has an unsupported format version
    #[error("Unsupported model format version {found} (supported: {supported})")]
    Version {
        /// Version read from the artifact
        found: u32,

        /// Human-readable supported range
        supported: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A trainer could not produce a model from the supplied rows
    #[error("Training error: {0}")]
    Training(String),
}

impl Error {
    /// Shorthand for a schema error on `column`
    pub fn schema(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the pipeline step that produced it
    pub fn in_stage(self, index: usize, name: impl Into<String>) -> Self {
        Error::Stage {
            index,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Get the innermost error, looking through stage wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
