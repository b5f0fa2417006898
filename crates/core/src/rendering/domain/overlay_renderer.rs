use thiserror::Error;

use super::ar_product::{ArProduct, ProductCategory};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::placement::domain::ar_settings::ArSettings;
use crate::placement::domain::transform_calculator::TransformError;
use crate::shared::frame::FrameSize;
use crate::shared::surface::SharedSurface;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("renderer not initialized; call init() first")]
    NotInitialized,
    #[error("failed to load overlay asset {url}: {source}")]
    AssetLoad {
        url: String,
        #[source]
        source: Box<dyn std::error::Error>,
    },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("draw failed: {source}")]
    Draw {
        #[source]
        source: Box<dyn std::error::Error>,
    },
}

/// Draws one product category's overlay onto a shared surface.
///
/// Lifecycle: `init` → (`set_product` | `render` | `resize`)* → `dispose`.
/// After `dispose` a fresh `init` is required.
pub trait OverlayRenderer: Send {
    fn category(&self) -> ProductCategory;

    /// Binds to `surface` and creates the scene, camera and render context.
    /// No-op when already initialized.
    fn init(&mut self, surface: SharedSurface) -> Result<(), RendererError>;

    fn is_initialized(&self) -> bool;

    /// Replaces the installed overlay with `product`'s.
    ///
    /// The previous mesh is released before loading; on failure no mesh is
    /// installed.
    fn set_product(&mut self, product: &ArProduct) -> Result<(), RendererError>;

    /// Places the overlay on `landmarks` and draws one frame.
    /// Clears the surface when no product is installed.
    fn render(
        &mut self,
        landmarks: &FaceLandmarks,
        settings: &ArSettings,
        frame: FrameSize,
    ) -> Result<(), RendererError>;

    fn resize(&mut self, width: u32, height: u32);

    fn dispose(&mut self);
}
