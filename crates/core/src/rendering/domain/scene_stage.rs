use std::sync::PoisonError;

use super::overlay_renderer::RendererError;
use super::render_context::RenderContext;
use super::scene::{OverlayMesh, PerspectiveCamera, Scene};
use crate::shared::surface::SharedSurface;

/// Builds a render context for a surface of the given size.
pub type ContextFactory = Box<dyn Fn(u32, u32) -> Box<dyn RenderContext> + Send>;

/// Scene, camera and render context lifecycle shared by every renderer.
///
/// Renderers compose a stage and add only their product-specific placement.
pub struct SceneStage {
    factory: ContextFactory,
    live: Option<Live>,
}

struct Live {
    scene: Scene,
    camera: PerspectiveCamera,
    context: Box<dyn RenderContext>,
    surface: SharedSurface,
}

impl SceneStage {
    pub fn new(factory: ContextFactory) -> Self {
        Self {
            factory,
            live: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    /// Binds to `surface`. No-op when already initialized.
    pub fn init(&mut self, surface: SharedSurface) {
        if self.live.is_some() {
            return;
        }
        let (width, height) = {
            let s = surface.lock().unwrap_or_else(PoisonError::into_inner);
            (s.width(), s.height())
        };
        let mut camera = PerspectiveCamera::new(1.0);
        camera.set_aspect(width, height);
        let context = (self.factory)(width, height);
        log::debug!("Scene stage initialized ({width}x{height}, {} context)", context.name());
        self.live = Some(Live {
            scene: Scene::default(),
            camera,
            context,
            surface,
        });
    }

    pub fn mesh(&self) -> Option<&OverlayMesh> {
        self.live.as_ref().and_then(|l| l.scene.mesh())
    }

    pub fn mesh_mut(&mut self) -> Option<&mut OverlayMesh> {
        self.live.as_mut().and_then(|l| l.scene.mesh_mut())
    }

    /// Removes the installed mesh and frees its render resources.
    pub fn clear_mesh(&mut self) {
        if let Some(live) = self.live.as_mut() {
            if let Some(old) = live.scene.take_mesh() {
                live.context.release(old.id());
            }
        }
    }

    pub fn install_mesh(&mut self, mesh: OverlayMesh) -> Result<(), RendererError> {
        let live = self.live.as_mut().ok_or(RendererError::NotInitialized)?;
        if let Some(old) = live.scene.install(mesh) {
            live.context.release(old.id());
        }
        Ok(())
    }

    pub fn draw(&mut self) -> Result<(), RendererError> {
        let live = self.live.as_mut().ok_or(RendererError::NotInitialized)?;
        let mut surface = live.surface.lock().unwrap_or_else(PoisonError::into_inner);
        live.context
            .draw(&live.scene, &live.camera, &mut surface)
            .map_err(|source| RendererError::Draw { source })
    }

    pub fn clear(&mut self) -> Result<(), RendererError> {
        let live = self.live.as_mut().ok_or(RendererError::NotInitialized)?;
        let mut surface = live.surface.lock().unwrap_or_else(PoisonError::into_inner);
        live.context.clear(&mut surface);
        Ok(())
    }

    /// Updates camera aspect, surface size and context targets.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.camera.set_aspect(width, height);
        live.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resize(width, height);
        live.context.resize(width, height);
    }

    /// Releases the mesh and all context resources. Requires a fresh `init`.
    pub fn dispose(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Some(mesh) = live.scene.take_mesh() {
                live.context.release(mesh.id());
            }
            live.context.dispose();
            log::debug!("Scene stage disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::domain::scene::OverlayTexture;
    use crate::shared::surface::{RenderSurface, SharedSurface};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
    }

    struct RecordingContext {
        log: Arc<Mutex<Log>>,
    }

    impl RenderContext for RecordingContext {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.push(format!("resize {width}x{height}"));
        }

        fn clear(&mut self, surface: &mut RenderSurface) {
            surface.clear();
            self.push("clear".to_string());
        }

        fn draw(
            &mut self,
            scene: &Scene,
            camera: &PerspectiveCamera,
            _surface: &mut RenderSurface,
        ) -> Result<(), Box<dyn std::error::Error>> {
            self.push(format!(
                "draw mesh={} aspect={:.2}",
                scene.mesh().is_some(),
                camera.aspect
            ));
            Ok(())
        }

        fn release(&mut self, mesh_id: u64) {
            self.push(format!("release {mesh_id}"));
        }

        fn dispose(&mut self) {
            self.push("dispose".to_string());
        }
    }

    impl RecordingContext {
        fn push(&self, event: String) {
            self.log.lock().unwrap().events.push(event);
        }
    }

    fn stage() -> (SceneStage, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let factory_log = log.clone();
        let stage = SceneStage::new(Box::new(move |_, _| {
            Box::new(RecordingContext {
                log: factory_log.clone(),
            }) as Box<dyn RenderContext>
        }));
        (stage, log)
    }

    fn mesh() -> OverlayMesh {
        OverlayMesh::from_texture(Arc::new(OverlayTexture::new(1, 1, vec![0; 4])))
    }

    fn surface(w: u32, h: u32) -> SharedSurface {
        RenderSurface::shared(w, h)
    }

    #[test]
    fn test_operations_before_init_fail() {
        let (mut stage, _) = stage();
        assert!(matches!(stage.draw(), Err(RendererError::NotInitialized)));
        assert!(matches!(
            stage.install_mesh(mesh()),
            Err(RendererError::NotInitialized)
        ));
    }

    #[test]
    fn test_camera_aspect_follows_surface() {
        let (mut stage, log) = stage();
        stage.init(surface(200, 100));
        stage.draw().unwrap();
        stage.resize(100, 100);
        stage.draw().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            log.events,
            ["draw mesh=false aspect=2.00", "resize 100x100", "draw mesh=false aspect=1.00"]
        );
    }

    #[test]
    fn test_resize_resizes_shared_surface() {
        let (mut stage, _) = stage();
        let shared = surface(4, 4);
        stage.init(shared.clone());
        stage.resize(8, 2);
        assert_eq!(shared.lock().unwrap().width(), 8);
        assert_eq!(shared.lock().unwrap().height(), 2);
    }

    #[test]
    fn test_install_releases_previous_mesh() {
        let (mut stage, log) = stage();
        stage.init(surface(4, 4));
        let first = mesh();
        let first_id = first.id();

        stage.install_mesh(first).unwrap();
        stage.install_mesh(mesh()).unwrap();

        assert_eq!(log.lock().unwrap().events, vec![format!("release {first_id}")]);
    }

    #[test]
    fn test_init_is_idempotent() {
        let (mut stage, _) = stage();
        stage.init(surface(4, 4));
        stage.install_mesh(mesh()).unwrap();
        stage.init(surface(8, 8));
        assert!(stage.mesh().is_some());
    }

    #[test]
    fn test_dispose_releases_everything() {
        let (mut stage, log) = stage();
        stage.init(surface(4, 4));
        let m = mesh();
        let id = m.id();
        stage.install_mesh(m).unwrap();

        stage.dispose();

        assert!(!stage.is_initialized());
        assert_eq!(
            log.lock().unwrap().events,
            vec![format!("release {id}"), "dispose".to_string()]
        );
        assert!(matches!(stage.clear(), Err(RendererError::NotInitialized)));
    }
}
