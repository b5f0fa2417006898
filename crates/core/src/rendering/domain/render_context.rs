use super::scene::{PerspectiveCamera, Scene};
use crate::shared::surface::RenderSurface;

/// Rasterizes a `Scene` into a `RenderSurface`.
///
/// Implementations may cache per-mesh resources keyed on `OverlayMesh::id`;
/// `release` frees them.
pub trait RenderContext: Send {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self, surface: &mut RenderSurface);

    /// Replaces the surface contents with one frame of `scene`.
    fn draw(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        surface: &mut RenderSurface,
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn release(&mut self, mesh_id: u64);

    fn dispose(&mut self);
}
