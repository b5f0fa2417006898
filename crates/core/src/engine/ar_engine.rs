use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use super::engine_config::EngineConfig;
use super::engine_state::{EngineState, StateCell};
use super::frame_loop::{
    apply_command, LoopCommand, LoopContext, LoopParts, SharedLandmarks, SharedScheduler,
};
use super::frame_scheduler::{FrameScheduler, IntervalScheduler};
use super::loop_logger::{LoopLogger, StatsLoopLogger};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::frame_source::FrameSource;
use crate::detection::domain::landmark_detector::{DetectorError, LandmarkDetector};
use crate::detection::domain::landmark_model::LandmarkBackend;
use crate::detection::infrastructure::onnx_face_mesh_backend::OnnxFaceMeshBackend;
use crate::placement::domain::ar_settings::{ArSettings, SettingsPatch};
use crate::rendering::domain::ar_product::ArProduct;
use crate::rendering::domain::overlay_renderer::{OverlayRenderer, RendererError};
use crate::rendering::infrastructure::glasses_renderer::GlassesRenderer;
use crate::shared::surface::SharedSurface;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
}

pub type BackendFactory = Box<dyn Fn(&EngineConfig) -> Box<dyn LandmarkBackend> + Send>;
pub type RendererFactory = Box<dyn Fn(&EngineConfig) -> Box<dyn OverlayRenderer> + Send>;
pub type LoggerFactory = Box<dyn Fn() -> Box<dyn LoopLogger> + Send>;

/// How the engine builds its collaborators.
///
/// Detector and renderer are constructed lazily on the first `start` and
/// again after `dispose`.
pub struct EngineComponents {
    pub backend: BackendFactory,
    pub renderer: RendererFactory,
    pub scheduler: Box<dyn FrameScheduler>,
    pub logger: LoggerFactory,
}

impl EngineComponents {
    /// ONNX face mesh, glasses overlay, loop paced at `target_fps`.
    pub fn standard(config: &EngineConfig) -> Self {
        Self {
            backend: Box::new(|config: &EngineConfig| {
                Box::new(OnnxFaceMeshBackend::new(config.model_location())) as Box<dyn LandmarkBackend>
            }),
            renderer: Box::new(|config: &EngineConfig| {
                Box::new(GlassesRenderer::with_backend(config.backend)) as Box<dyn OverlayRenderer>
            }),
            scheduler: Box::new(IntervalScheduler::new(config.target_fps)),
            logger: Box::new(|| Box::new(StatsLoopLogger::new()) as Box<dyn LoopLogger>),
        }
    }
}

struct Worker {
    handle: JoinHandle<LoopParts>,
    running: Arc<AtomicBool>,
    stop: Sender<()>,
}

/// Orchestrates detection and rendering over a live frame source.
///
/// `start` loads everything and spawns the loop on a worker thread; `stop`
/// joins it and keeps the loaded components for a cheap restart; `dispose`
/// tears everything down.
pub struct ArEngine {
    config: EngineConfig,
    backend_factory: BackendFactory,
    renderer_factory: RendererFactory,
    logger_factory: LoggerFactory,
    scheduler: SharedScheduler,

    detector: Option<LandmarkDetector>,
    renderer: Option<Box<dyn OverlayRenderer>>,
    surface: Option<SharedSurface>,
    product: Option<ArProduct>,
    /// A stored product the renderer has not installed yet.
    product_pending: bool,

    settings: Arc<Mutex<ArSettings>>,
    state: Arc<StateCell>,
    landmarks: SharedLandmarks,
    commands_tx: Sender<LoopCommand>,
    commands_rx: Receiver<LoopCommand>,
    worker: Option<Worker>,
}

impl ArEngine {
    pub fn new(config: EngineConfig, components: EngineComponents) -> Self {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            backend_factory: components.backend,
            renderer_factory: components.renderer,
            logger_factory: components.logger,
            scheduler: Arc::new(Mutex::new(components.scheduler)),
            detector: None,
            renderer: None,
            surface: None,
            product: None,
            product_pending: false,
            settings: Arc::new(Mutex::new(ArSettings::default())),
            state: Arc::new(StateCell::new()),
            landmarks: Arc::new(Mutex::new(None)),
            commands_tx,
            commands_rx,
            worker: None,
        }
    }

    pub fn with_defaults(config: EngineConfig) -> Self {
        let components = EngineComponents::standard(&config);
        Self::new(config, components)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    /// Channel of state snapshots, starting with the current one.
    pub fn subscribe(&self) -> Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Landmarks from the most recent successful detection.
    pub fn landmarks(&self) -> Option<Arc<FaceLandmarks>> {
        self.landmarks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the loop is live. False once frame callbacks have ended, even
    /// before `stop` reclaims the worker.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.running.load(Ordering::Acquire))
    }

    /// Loads the model and renderer, then starts the per-frame loop.
    ///
    /// On failure the error is also recorded in `EngineState::error` and no
    /// loop iteration runs. A running loop is stopped first.
    pub fn start(
        &mut self,
        source: Arc<dyn FrameSource>,
        surface: SharedSurface,
    ) -> Result<(), EngineError> {
        if self.worker.is_some() {
            self.stop();
        }

        self.state.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let parts = match self.prepare(surface) {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("AR engine failed to start: {e}");
                let message = e.to_string();
                self.state.update(|s| {
                    s.is_loading = false;
                    s.is_detecting = false;
                    s.error = Some(message);
                });
                return Err(e);
            }
        };

        self.state.update(|s| {
            s.is_loading = false;
            s.is_detecting = true;
        });
        self.spawn(parts, source);
        log::info!("AR engine started");
        Ok(())
    }

    /// Loads the detector and readies the renderer, handing both to the caller.
    ///
    /// On failure whatever was built stays with the engine for the next try.
    fn prepare(&mut self, surface: SharedSurface) -> Result<LoopParts, EngineError> {
        let mut detector = match self.detector.take() {
            Some(detector) => detector,
            None => LandmarkDetector::new(
                (self.backend_factory)(&self.config),
                self.config.backend,
                self.config.model_options(),
            ),
        };
        if !detector.is_ready() {
            if let Err(e) = detector.load() {
                self.detector = Some(detector);
                return Err(e.into());
            }
        }
        self.state.update(|s| s.is_model_loaded = true);

        let mut renderer = match self.renderer.take() {
            Some(renderer) => renderer,
            None => (self.renderer_factory)(&self.config),
        };
        if let Err(e) = self.prepare_renderer(renderer.as_mut(), surface) {
            self.detector = Some(detector);
            self.renderer = Some(renderer);
            return Err(e);
        }

        Ok(LoopParts { detector, renderer })
    }

    fn prepare_renderer(
        &mut self,
        renderer: &mut dyn OverlayRenderer,
        surface: SharedSurface,
    ) -> Result<(), EngineError> {
        let same_surface = self
            .surface
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &surface));
        if renderer.is_initialized() && !same_surface {
            renderer.dispose();
        }
        if !renderer.is_initialized() {
            renderer.init(surface.clone())?;
            self.surface = Some(surface);
            self.product_pending = self.product.is_some();
        }

        if self.product_pending {
            if let Some(product) = &self.product {
                renderer.set_product(product)?;
            }
            self.product_pending = false;
        }
        Ok(())
    }

    fn spawn(&mut self, parts: LoopParts, source: Arc<dyn FrameSource>) {
        self.scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let context = LoopContext {
            parts,
            scheduler: self.scheduler.clone(),
            source,
            settings: self.settings.clone(),
            state: self.state.clone(),
            landmarks: self.landmarks.clone(),
            commands: self.commands_rx.clone(),
            stop: stop_rx,
            running: running.clone(),
            logger: (self.logger_factory)(),
        };

        self.worker = Some(Worker {
            handle: std::thread::spawn(move || context.run()),
            running,
            stop: stop_tx,
        });
    }

    /// Halts the loop and waits for the in-flight iteration.
    ///
    /// Keeps the loaded detector and renderer. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.running.store(false, Ordering::Release);
            drop(worker.stop);
            match worker.handle.join() {
                Ok(parts) => {
                    self.detector = Some(parts.detector);
                    self.renderer = Some(parts.renderer);
                }
                Err(_) => {
                    log::error!("AR loop worker panicked; components will be rebuilt");
                    self.surface = None;
                    self.state.update(|s| s.is_model_loaded = false);
                }
            }
            self.drain_commands();
            log::info!("AR engine stopped");
        }

        self.state.update(|s| {
            s.is_detecting = false;
            s.face_detected = false;
        });
    }

    /// Reclaims the components of a loop whose frame callbacks have ended.
    fn reap_finished_loop(&mut self) {
        if self.worker.is_some() && !self.is_running() {
            self.stop();
        }
    }

    /// Commands the loop never picked up apply directly to the idle renderer.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            match self.renderer.as_deref_mut() {
                Some(renderer) if renderer.is_initialized() => apply_command(renderer, command),
                _ => {
                    if matches!(command, LoopCommand::SetProduct(_)) {
                        self.product_pending = true;
                    }
                }
            }
        }
    }

    /// Swaps the tried-on product.
    ///
    /// A running loop installs it at its next iteration; otherwise an
    /// initialized renderer installs it now. Load failures are logged only.
    pub fn set_product(&mut self, product: ArProduct) {
        self.product = Some(product.clone());
        self.reap_finished_loop();

        if self.worker.is_some() {
            // Unbounded and the receiver lives in self; cannot fail.
            let _ = self.commands_tx.send(LoopCommand::SetProduct(product));
            self.product_pending = false;
            return;
        }

        match self.renderer.as_deref_mut() {
            Some(renderer) if renderer.is_initialized() => {
                self.product_pending = false;
                if let Err(e) = renderer.set_product(&product) {
                    log::error!("Failed to set product {}: {e}", product.id);
                    self.product_pending = true;
                }
            }
            _ => self.product_pending = true,
        }
    }

    /// Merges `patch` into the live settings; seen from the next iteration.
    pub fn set_settings(&self, patch: SettingsPatch) {
        let mut settings = self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *settings = settings.merged(&patch);
    }

    pub fn settings(&self) -> ArSettings {
        *self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Resizes the render surface, through the loop when it is running.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.reap_finished_loop();
        if self.worker.is_some() {
            let _ = self.commands_tx.send(LoopCommand::Resize { width, height });
        } else if let Some(renderer) = self.renderer.as_deref_mut() {
            renderer.resize(width, height);
        }
    }

    /// Stops the loop and releases the detector and renderer.
    ///
    /// A later `start` rebuilds both.
    pub fn dispose(&mut self) {
        self.stop();
        if let Some(mut detector) = self.detector.take() {
            detector.dispose();
        }
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
        }
        self.surface = None;
        self.product_pending = self.product.is_some();
        *self
            .landmarks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.state.update(|s| s.is_model_loaded = false);
        log::debug!("AR engine disposed");
    }
}

impl Drop for ArEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
