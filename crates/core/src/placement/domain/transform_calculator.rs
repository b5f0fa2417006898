use glam::DVec3;
use thiserror::Error;

use super::ar_settings::ArSettings;
use super::ar_transform::ArTransform;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::constants::{
    CALIBRATION_BASELINE, EYE_CENTER_INDEX, LEFT_EYE_INDEX, RIGHT_EYE_INDEX,
};
use crate::shared::frame::FrameSize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransformError {
    #[error("face mesh has {available} points, anchor lookup needs {required}")]
    InsufficientLandmarks { required: usize, available: usize },
}

/// Pixel-to-scene-unit factor applied to the anchor's offset from frame center.
const PIXEL_TO_SCENE: f64 = -0.01;

/// Depth the overlay sits at, between the face plane and the camera.
const OVERLAY_DEPTH: f64 = 1.0;

/// Maximum scene-unit shift produced by an offset setting at 0 or 100.
const MAX_OFFSET: f64 = 0.5;

/// Maps face landmarks plus user settings to an overlay transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformCalculator {
    left: usize,
    right: usize,
    center: usize,
}

impl Default for TransformCalculator {
    fn default() -> Self {
        Self::new(LEFT_EYE_INDEX, RIGHT_EYE_INDEX, EYE_CENTER_INDEX)
    }
}

impl TransformCalculator {
    pub fn new(left: usize, right: usize, center: usize) -> Self {
        Self {
            left,
            right,
            center,
        }
    }

    /// Mesh length needed to read every anchor.
    pub fn required_points(&self) -> usize {
        self.left.max(self.right).max(self.center) + 1
    }

    pub fn calculate(
        &self,
        landmarks: &FaceLandmarks,
        settings: &ArSettings,
        frame: FrameSize,
    ) -> Result<ArTransform, TransformError> {
        let anchor = |i: usize| {
            landmarks
                .point(i)
                .ok_or(TransformError::InsufficientLandmarks {
                    required: self.required_points(),
                    available: landmarks.len(),
                })
        };
        let left = anchor(self.left)?;
        let right = anchor(self.right)?;
        let center = anchor(self.center)?;

        let eye_distance = left.truncate().distance(right.truncate());
        let scale = eye_distance / CALIBRATION_BASELINE * (settings.scale / 100.0);

        let offset_x = offset(settings.offset_x);
        let offset_y = offset(settings.offset_y);
        let position = DVec3::new(
            (center.x - frame.width as f64 / 2.0) * PIXEL_TO_SCENE + offset_x,
            (center.y - frame.height as f64 / 2.0) * PIXEL_TO_SCENE + offset_y,
            OVERLAY_DEPTH,
        );

        let roll = (right.y - left.y).atan2(right.x - left.x);

        Ok(ArTransform {
            position,
            rotation: DVec3::new(0.0, 0.0, roll),
            scale: DVec3::splat(scale),
        })
    }
}

/// 0..100 setting to a signed shift; 50 is neutral.
fn offset(setting: f64) -> f64 {
    (setting - 50.0) / 50.0 * MAX_OFFSET
}
