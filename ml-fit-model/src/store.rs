//! Model persistence
//!
//! An artifact is a small fixed header followed by a bincode payload:
//!
//! ```text
//! magic    4 bytes   b"MLFT"
//! version  u32 LE
//! crc32    u32 LE    checksum of the payload
//! payload            bincode(ModelArtifact)
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use ml_fit_core::{Error, PipelineConfig, Result, Schema};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::Model;

/// Leading bytes of every artifact
pub const MAGIC: &[u8; 4] = b"MLFT";

/// Format version written by this build
pub const FORMAT_VERSION: u32 = 1;

/// Format versions this build can read
pub const SUPPORTED_VERSIONS: RangeInclusive<u32> = 1..=FORMAT_VERSION;

const HEADER_LEN: usize = 12;

/// Everything stored in an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Schema of the data the model was trained on
    pub input_schema: Schema,

    /// The trained model
    pub model: Model,
}

/// Borrowed form of [`ModelArtifact`] with the same encoding
#[derive(Serialize)]
struct ModelArtifactRef<'a> {
    input_schema: &'a Schema,
    model: &'a Model,
}

/// Saves and loads model artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelStore;

impl ModelStore {
    /// Write `model` to `path`, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(model: &Model, path: P, config: &PipelineConfig) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        let bytes = Self::save_to_writer(model, &mut writer)?;
        writer.flush()?;
        drop(writer);

        if config.verify_checksum {
            let written = std::fs::read(path)?;
            split_artifact(&written, true)?;
        }

        info!(path = %path.display(), bytes, model_id = %model.id(), "Saved model");
        Ok(())
    }

    /// Write `model` to any writer, returning the number of bytes written
    pub fn save_to_writer<W: Write>(model: &Model, writer: &mut W) -> Result<usize> {
        let artifact = ModelArtifactRef {
            input_schema: model.input_schema(),
            model,
        };
        let payload = bincode::serialize(&artifact)?;
        let checksum = crc32fast::hash(&payload);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&checksum.to_le_bytes())?;
        writer.write_all(&payload)?;
        Ok(HEADER_LEN + payload.len())
    }

    /// Read a model and its training schema from `path`
    pub fn load<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<(Model, Schema)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = BufReader::new(File::open(path)?);
        let (model, schema) = Self::load_from_reader(&mut reader, config)?;
        info!(path = %path.display(), model_id = %model.id(), "Loaded model");
        Ok((model, schema))
    }

    /// Read a model and its training schema from any reader
    pub fn load_from_reader<R: Read>(reader: &mut R, config: &PipelineConfig) -> Result<(Model, Schema)> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let (version, payload) = split_artifact(&bytes, config.verify_checksum)?;

        let artifact: ModelArtifact = bincode::deserialize(payload)
            .map_err(|e| Error::CorruptArtifact(format!("cannot decode payload: {}", e)))?;
        artifact.model.validate(&artifact.input_schema)?;
        debug!(version, steps = artifact.model.steps().len(), "Decoded model artifact");
        Ok((artifact.model, artifact.input_schema))
    }
}

/// Check the header of an encoded artifact and return its version and payload
fn split_artifact(bytes: &[u8], verify_checksum: bool) -> Result<(u32, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::CorruptArtifact(format!(
            "artifact is {} bytes, shorter than its header",
            bytes.len()
        )));
    }

    let (header, payload) = bytes.split_at(HEADER_LEN);
    if &header[0..4] != MAGIC {
        return Err(Error::CorruptArtifact("not a model artifact".to_string()));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(Error::Version {
            found: version,
            supported: format!("{}..={}", SUPPORTED_VERSIONS.start(), SUPPORTED_VERSIONS.end()),
        });
    }

    let stored = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if verify_checksum {
        let actual = crc32fast::hash(payload);
        if actual != stored {
            return Err(Error::CorruptArtifact(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, actual
            )));
        }
    }
    Ok((version, payload))
}
