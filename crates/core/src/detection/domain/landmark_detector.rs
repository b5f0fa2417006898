use thiserror::Error;

use super::face_landmarks::FaceLandmarks;
use super::frame_source::FrameSource;
use super::landmark_model::{Backend, LandmarkBackend, LandmarkModel, ModelOptions};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to load face landmark model: {source}")]
    ModelLoad {
        #[source]
        source: Box<dyn std::error::Error>,
    },
    #[error("face landmark model not loaded; call load() first")]
    NotLoaded,
}

/// Face landmark detector over a pluggable inference backend.
///
/// Lifecycle: `load` → any number of `detect` → `dispose`. A failed load
/// leaves the detector uninitialized so `load` can simply be retried.
pub struct LandmarkDetector {
    backend: Box<dyn LandmarkBackend>,
    compute: Backend,
    options: ModelOptions,
    model: Option<Box<dyn LandmarkModel>>,
}

impl LandmarkDetector {
    pub fn new(backend: Box<dyn LandmarkBackend>, compute: Backend, options: ModelOptions) -> Self {
        Self {
            backend,
            compute,
            options,
            model: None,
        }
    }

    /// Prepares the compute backend and instantiates the model.
    ///
    /// No-op when a model is already loaded.
    pub fn load(&mut self) -> Result<(), DetectorError> {
        if self.model.is_some() {
            return Ok(());
        }

        self.backend.prepare(self.compute).map_err(|source| {
            log::error!("Landmark backend '{}' failed to initialize: {source}", self.compute);
            DetectorError::ModelLoad { source }
        })?;

        let model = self.backend.load_model(&self.options).map_err(|source| {
            log::error!("Failed to load face landmark model: {source}");
            DetectorError::ModelLoad { source }
        })?;

        log::info!(
            "Face landmark model loaded (backend={}, max_faces={}, iris_detail={})",
            self.compute,
            self.options.max_faces,
            self.options.iris_detail
        );
        self.model = Some(model);
        Ok(())
    }

    /// Landmarks of the first face in the source's current frame.
    ///
    /// `Ok(None)` covers every non-fatal miss: the source has no decoded
    /// frame yet, no face was found, or inference failed for this frame.
    pub fn detect(&mut self, source: &dyn FrameSource) -> Result<Option<FaceLandmarks>, DetectorError> {
        let model = self.model.as_mut().ok_or(DetectorError::NotLoaded)?;

        if !source.is_ready() {
            return Ok(None);
        }
        let Some(frame) = source.snapshot() else {
            return Ok(None);
        };

        let faces = match model.estimate_faces(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Landmark detection failed on frame {}: {e}", frame.index());
                return Ok(None);
            }
        };

        Ok(faces.into_iter().next().and_then(FaceLandmarks::from_mesh))
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn dispose(&mut self) {
        if self.model.take().is_some() {
            log::debug!("Face landmark model released");
        }
    }
}
