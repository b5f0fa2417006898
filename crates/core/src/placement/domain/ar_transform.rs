use glam::{DMat4, DQuat, DVec3, EulerRot};

/// Overlay placement in scene units: translation, XYZ Euler radians, per-axis scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArTransform {
    pub position: DVec3,
    pub rotation: DVec3,
    pub scale: DVec3,
}

impl Default for ArTransform {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DVec3::ZERO,
            scale: DVec3::ONE,
        }
    }
}

impl ArTransform {
    /// Scale, then rotate (X, Y, Z), then translate.
    pub fn model_matrix(&self) -> DMat4 {
        let rotation = DQuat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        DMat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}
