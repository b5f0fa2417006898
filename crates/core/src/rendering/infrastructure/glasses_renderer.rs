use std::sync::Arc;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::landmark_model::Backend;
use crate::placement::domain::ar_settings::ArSettings;
use crate::placement::domain::transform_calculator::TransformCalculator;
use crate::rendering::domain::ar_product::{ArProduct, ProductCategory};
use crate::rendering::domain::asset_loader::AssetLoader;
use crate::rendering::domain::overlay_renderer::{OverlayRenderer, RendererError};
use crate::rendering::domain::scene::OverlayMesh;
use crate::rendering::domain::scene_stage::{ContextFactory, SceneStage};
use crate::shared::frame::FrameSize;
use crate::shared::surface::SharedSurface;

use super::image_asset_loader::ImageAssetLoader;
use super::render_context_factory::context_factory;

/// Eyewear overlay: a flat textured plane anchored on the eye line.
pub struct GlassesRenderer {
    stage: SceneStage,
    loader: Box<dyn AssetLoader>,
    calculator: TransformCalculator,
    product_id: Option<String>,
}

impl GlassesRenderer {
    pub fn new(loader: Box<dyn AssetLoader>, factory: ContextFactory) -> Self {
        Self {
            stage: SceneStage::new(factory),
            loader,
            calculator: TransformCalculator::default(),
            product_id: None,
        }
    }

    /// Image loader plus GPU (or CPU) rendering, per `preference`.
    pub fn with_backend(preference: Backend) -> Self {
        Self::new(Box::new(ImageAssetLoader::new()), context_factory(preference))
    }

    /// Id of the product whose overlay is installed.
    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }
}

impl OverlayRenderer for GlassesRenderer {
    fn category(&self) -> ProductCategory {
        ProductCategory::Glasses
    }

    fn init(&mut self, surface: SharedSurface) -> Result<(), RendererError> {
        self.stage.init(surface);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.stage.is_initialized()
    }

    fn set_product(&mut self, product: &ArProduct) -> Result<(), RendererError> {
        if !self.stage.is_initialized() {
            return Err(RendererError::NotInitialized);
        }
        if product.category != ProductCategory::Glasses {
            log::warn!(
                "Product {} is {}, rendering it as a flat eyewear overlay",
                product.id,
                product.category
            );
        }

        self.stage.clear_mesh();
        self.product_id = None;

        let texture = self
            .loader
            .load(&product.overlay_url)
            .map_err(|source| RendererError::AssetLoad {
                url: product.overlay_url.clone(),
                source,
            })?;

        self.stage
            .install_mesh(OverlayMesh::from_texture(Arc::new(texture)))?;
        self.product_id = Some(product.id.clone());
        log::info!("Installed overlay for product {}", product.id);
        Ok(())
    }

    fn render(
        &mut self,
        landmarks: &FaceLandmarks,
        settings: &ArSettings,
        frame: FrameSize,
    ) -> Result<(), RendererError> {
        if !self.stage.is_initialized() {
            return Err(RendererError::NotInitialized);
        }
        if self.stage.mesh().is_none() {
            return self.stage.clear();
        }

        let transform = match self.calculator.calculate(landmarks, settings, frame) {
            Ok(t) => t,
            Err(e) => {
                self.stage.clear()?;
                return Err(e.into());
            }
        };
        if let Some(mesh) = self.stage.mesh_mut() {
            mesh.transform = transform;
            mesh.opacity = settings.alpha();
        }
        self.stage.draw()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.stage.resize(width, height);
    }

    fn dispose(&mut self) {
        self.stage.dispose();
        self.product_id = None;
    }
}
