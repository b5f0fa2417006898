//! Per-frame detection → placement → render loop run on the engine's worker thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crossbeam_channel::Receiver;

use super::engine_state::StateCell;
use super::fps_counter::FpsCounter;
use super::frame_scheduler::FrameScheduler;
use super::loop_logger::LoopLogger;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::frame_source::FrameSource;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::placement::domain::ar_settings::ArSettings;
use crate::rendering::domain::ar_product::ArProduct;
use crate::rendering::domain::overlay_renderer::OverlayRenderer;

pub type SharedLandmarks = Arc<Mutex<Option<Arc<FaceLandmarks>>>>;

/// Scheduler shared with the worker so it outlives a panicked loop.
pub type SharedScheduler = Arc<Mutex<Box<dyn FrameScheduler>>>;

/// Requests the host hands to a running loop.
#[derive(Debug, Clone)]
pub enum LoopCommand {
    SetProduct(ArProduct),
    Resize { width: u32, height: u32 },
}

/// Components owned by whichever side currently drives them: the engine
/// while stopped, the worker while running.
pub struct LoopParts {
    pub detector: LandmarkDetector,
    pub renderer: Box<dyn OverlayRenderer>,
}

/// Everything one loop run reads or writes.
pub struct LoopContext {
    pub parts: LoopParts,
    pub scheduler: SharedScheduler,
    pub source: Arc<dyn FrameSource>,
    pub settings: Arc<Mutex<ArSettings>>,
    pub state: Arc<StateCell>,
    pub landmarks: SharedLandmarks,
    pub commands: Receiver<LoopCommand>,
    pub stop: Receiver<()>,
    pub running: Arc<AtomicBool>,
    pub logger: Box<dyn LoopLogger>,
}

impl LoopContext {
    /// Runs until stopped, then hands the components back.
    ///
    /// If the frame callbacks end without a stop request the loop marks
    /// itself stopped and publishes `is_detecting = false`.
    pub fn run(mut self) -> LoopParts {
        let mut fps = FpsCounter::new(Instant::now());
        while self.next_frame() {
            if !self.step(&mut fps) {
                break;
            }
        }
        if self.running.swap(false, Ordering::AcqRel) {
            log::warn!("Frame callbacks ended; AR loop stopped");
            self.state.update(|s| {
                s.is_detecting = false;
                s.face_detected = false;
            });
        }
        self.logger.summary();
        self.parts
    }

    fn next_frame(&mut self) -> bool {
        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        scheduler.next_frame(&self.stop)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One iteration. Returns `false` once the loop is no longer current.
    ///
    /// A panic inside the iteration is logged and the loop carries on.
    pub(crate) fn step(&mut self, fps: &mut FpsCounter) -> bool {
        if !self.is_running() {
            return false;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.iterate(fps))) {
            Ok(current) => current,
            Err(payload) => {
                log::error!("AR loop iteration panicked: {}", panic_message(payload.as_ref()));
                self.is_running()
            }
        }
    }

    fn iterate(&mut self, fps: &mut FpsCounter) -> bool {
        self.apply_commands();
        if !self.is_running() {
            return false;
        }
        self.logger.iteration();

        let t0 = Instant::now();
        let detected = self.parts.detector.detect(self.source.as_ref());
        self.logger
            .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);

        match detected {
            Ok(Some(landmarks)) => {
                let landmarks = Arc::new(landmarks);
                *self
                    .landmarks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(landmarks.clone());
                self.state.update(|s| s.face_detected = true);
                self.render(&landmarks);
            }
            Ok(None) => self.state.update(|s| s.face_detected = false),
            Err(e) => log::warn!("Detection skipped: {e}"),
        }

        if let Some(count) = fps.tick(Instant::now()) {
            self.logger.metric("fps", count as f64);
            self.state.update(|s| s.fps = count);
        }

        self.is_running()
    }

    fn render(&mut self, landmarks: &FaceLandmarks) {
        let settings = *self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let frame = self.source.dimensions();

        let t0 = Instant::now();
        if let Err(e) = self.parts.renderer.render(landmarks, &settings, frame) {
            log::warn!("Render failed: {e}");
        }
        self.logger
            .timing("render", t0.elapsed().as_secs_f64() * 1000.0);
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            apply_command(self.parts.renderer.as_mut(), command);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Applies a command directly to a renderer. Failures are logged only.
pub fn apply_command(renderer: &mut dyn OverlayRenderer, command: LoopCommand) {
    match command {
        LoopCommand::SetProduct(product) => {
            if let Err(e) = renderer.set_product(&product) {
                log::error!("Failed to set product {}: {e}", product.id);
            }
        }
        LoopCommand::Resize { width, height } => renderer.resize(width, height),
    }
}
