//! Minimal scene graph: one camera and at most one overlay plane.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{DMat4, DVec3};

use crate::placement::domain::ar_transform::ArTransform;

/// Vertical field of view in degrees.
pub const CAMERA_FOV_Y: f64 = 75.0;
pub const CAMERA_NEAR: f64 = 0.1;
pub const CAMERA_FAR: f64 = 1000.0;
/// Camera sits on +Z looking at the origin.
pub const CAMERA_Z: f64 = 5.0;

/// Height of the overlay plane in scene units; width follows the image aspect.
pub const PLANE_HEIGHT: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_y: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    pub position: DVec3,
}

impl PerspectiveCamera {
    pub fn new(aspect: f64) -> Self {
        Self {
            fov_y: CAMERA_FOV_Y,
            aspect,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            position: DVec3::new(0.0, 0.0, CAMERA_Z),
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f64 / height as f64;
        }
    }

    pub fn view(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, DVec3::ZERO, DVec3::Y)
    }

    /// Right-handed perspective with a [0, 1] depth range.
    pub fn projection(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> DMat4 {
        self.projection() * self.view()
    }
}

/// Decoded RGBA8 overlay image (straight alpha, row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl OverlayTexture {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        debug_assert_eq!(
            rgba.len(),
            width as usize * height as usize * 4,
            "rgba length must equal width * height * 4"
        );
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Width over height; 1.0 for a degenerate image.
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }
}

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Textured plane placed by an `ArTransform`.
#[derive(Clone, Debug)]
pub struct OverlayMesh {
    id: u64,
    texture: Arc<OverlayTexture>,
    width: f64,
    height: f64,
    pub transform: ArTransform,
    pub opacity: f32,
}

impl OverlayMesh {
    /// Plane of `2·aspect × 2` scene units matching the texture's aspect ratio.
    pub fn from_texture(texture: Arc<OverlayTexture>) -> Self {
        let height = PLANE_HEIGHT;
        let width = PLANE_HEIGHT * texture.aspect();
        Self {
            id: NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed),
            texture,
            width,
            height,
            transform: ArTransform::default(),
            opacity: 1.0,
        }
    }

    /// Unique per mesh; render contexts key cached GPU resources on it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn texture(&self) -> &Arc<OverlayTexture> {
        &self.texture
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Maps the unit quad `[-0.5, 0.5]²` to world space.
    pub fn world_matrix(&self) -> DMat4 {
        self.transform.model_matrix()
            * DMat4::from_scale(DVec3::new(self.width, self.height, 1.0))
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    mesh: Option<OverlayMesh>,
}

impl Scene {
    pub fn mesh(&self) -> Option<&OverlayMesh> {
        self.mesh.as_ref()
    }

    pub fn mesh_mut(&mut self) -> Option<&mut OverlayMesh> {
        self.mesh.as_mut()
    }

    /// Install `mesh`, returning the one it replaces.
    pub fn install(&mut self, mesh: OverlayMesh) -> Option<OverlayMesh> {
        self.mesh.replace(mesh)
    }

    pub fn take_mesh(&mut self) -> Option<OverlayMesh> {
        self.mesh.take()
    }
}
