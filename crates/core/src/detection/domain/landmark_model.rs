use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::shared::frame::Frame;

/// Compute backend the landmark model runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Platform GPU acceleration where available.
    #[default]
    Gpu,
    /// Portable CPU fallback.
    Cpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Gpu => write!(f, "gpu"),
            Backend::Cpu => write!(f, "cpu"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Backend::Gpu),
            "cpu" => Ok(Backend::Cpu),
            other => Err(format!("unknown backend '{other}', expected 'gpu' or 'cpu'")),
        }
    }
}

/// Options a model is instantiated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelOptions {
    pub max_faces: usize,
    pub iris_detail: bool,
}

/// Mesh points of one face in frame pixel coordinates.
pub type FaceMesh = Vec<DVec3>;

/// A loaded landmark inference model.
///
/// `&mut self` because sessions may keep per-call scratch state.
pub trait LandmarkModel: Send {
    /// Estimates face meshes for one frame, most confident face first.
    fn estimate_faces(&mut self, frame: &Frame) -> Result<Vec<FaceMesh>, Box<dyn std::error::Error>>;
}

/// Selects a compute backend and instantiates landmark models on it.
pub trait LandmarkBackend: Send {
    /// Selects `backend` and blocks until it is ready for inference.
    fn prepare(&mut self, backend: Backend) -> Result<(), Box<dyn std::error::Error>>;

    /// Instantiates the model. Only called after a successful `prepare`.
    fn load_model(
        &mut self,
        options: &ModelOptions,
    ) -> Result<Box<dyn LandmarkModel>, Box<dyn std::error::Error>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gpu", Backend::Gpu)]
    #[case("GPU", Backend::Gpu)]
    #[case("cpu", Backend::Cpu)]
    fn test_backend_parses(#[case] input: &str, #[case] expected: Backend) {
        assert_eq!(input.parse::<Backend>().unwrap(), expected);
    }

    #[test]
    fn test_backend_rejects_unknown() {
        let err = "webgl".parse::<Backend>().unwrap_err();
        assert!(err.contains("webgl"));
    }

    #[test]
    fn test_backend_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Backend::Cpu).unwrap(), "\"cpu\"");
        let parsed: Backend = serde_json::from_str("\"gpu\"").unwrap();
        assert_eq!(parsed, Backend::Gpu);
    }
}
