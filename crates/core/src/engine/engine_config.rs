use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::landmark_model::{Backend, ModelOptions};
use crate::shared::model_resolver::ModelLocation;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Construction-time engine configuration. Immutable once the engine exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Faces requested from the model; only the first is used for placement.
    pub max_faces: usize,
    /// Load the iris-refined mesh (478 points instead of 468).
    pub iris_detail: bool,
    pub backend: Backend,
    /// Loop pacing when the engine schedules its own frame callbacks.
    pub target_fps: u32,
    pub model_dir: Option<PathBuf>,
    pub model_base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_faces: 1,
            iris_detail: true,
            backend: Backend::Gpu,
            target_fps: 30,
            model_dir: None,
            model_base_url: None,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            max_faces: self.max_faces.max(1),
            iris_detail: self.iris_detail,
        }
    }

    pub fn model_location(&self) -> ModelLocation {
        ModelLocation {
            model_dir: self.model_dir.clone(),
            base_url: self.model_base_url.clone(),
        }
    }
}
