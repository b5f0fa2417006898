use std::path::Path;
use std::sync::PoisonError;

use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::detection::infrastructure::latest_frame_source::LatestFrameSource;
use crate::imaging::domain::image_reader::ImageReader;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::placement::domain::ar_settings::ArSettings;
use crate::rendering::domain::ar_product::ArProduct;
use crate::rendering::domain::overlay_renderer::OverlayRenderer;
use crate::shared::surface::{RenderSurface, SharedSurface};

/// Single-image try-on: read → detect → render → composite → write.
///
/// Model, renderer and product are loaded on the first `execute` and reused
/// for every later image. Placement targets a mirrored preview, so the
/// rendered overlay is flipped back before it lands on the unmirrored photo.
pub struct TryOnImageUseCase {
    reader: Box<dyn ImageReader>,
    image_writer: Box<dyn ImageWriter>,
    detector: LandmarkDetector,
    renderer: Box<dyn OverlayRenderer>,
    product: ArProduct,
    settings: ArSettings,
    surface: SharedSurface,
    product_loaded: bool,
}

impl TryOnImageUseCase {
    pub fn new(
        reader: Box<dyn ImageReader>,
        image_writer: Box<dyn ImageWriter>,
        detector: LandmarkDetector,
        renderer: Box<dyn OverlayRenderer>,
        product: ArProduct,
        settings: ArSettings,
    ) -> Self {
        Self {
            reader,
            image_writer,
            detector,
            renderer,
            product,
            settings,
            surface: RenderSurface::shared(1, 1),
            product_loaded: false,
        }
    }

    /// Applies the overlay to one image and writes the result.
    ///
    /// Returns whether a face was found. Images without a face are written
    /// unchanged.
    pub fn execute(
        &mut self,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let mut frame = self.reader.read(input_path)?;
        self.prepare()?;

        let source = LatestFrameSource::new(frame.size());
        source.push(frame.clone());

        let face_found = match self.detector.detect(&source)? {
            Some(landmarks) => {
                self.renderer.resize(frame.width(), frame.height());
                self.renderer
                    .render(&landmarks, &self.settings, frame.size())?;
                let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
                surface.flip_horizontal();
                if !surface.composite_onto(&mut frame) {
                    return Err(format!(
                        "Overlay is {}x{} but image is {}x{}",
                        surface.width(),
                        surface.height(),
                        frame.width(),
                        frame.height()
                    )
                    .into());
                }
                true
            }
            None => {
                log::warn!("No face detected in {}", input_path.display());
                false
            }
        };

        self.image_writer.write(output_path, &frame)?;
        Ok(face_found)
    }

    fn prepare(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.detector.is_ready() {
            self.detector.load()?;
        }
        if !self.renderer.is_initialized() {
            self.renderer.init(self.surface.clone())?;
        }
        if !self.product_loaded {
            self.renderer.set_product(&self.product)?;
            self.product_loaded = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::landmark_model::{
        Backend, FaceMesh, LandmarkBackend, LandmarkModel, ModelOptions,
    };
    use crate::rendering::domain::asset_loader::AssetLoader;
    use crate::rendering::domain::render_context::RenderContext;
    use crate::rendering::domain::scene::OverlayTexture;
    use crate::rendering::infrastructure::cpu_render_context::CpuRenderContext;
    use crate::rendering::infrastructure::glasses_renderer::GlassesRenderer;
    use crate::shared::constants::{EYE_CENTER_INDEX, LEFT_EYE_INDEX, RIGHT_EYE_INDEX};
    use crate::shared::frame::Frame;
    use glam::DVec3;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubReader {
        width: u32,
        height: u32,
    }

    impl ImageReader for StubReader {
        fn read(&self, _path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
            let len = (self.width * self.height * 3) as usize;
            Ok(Frame::new(vec![0; len], self.width, self.height, 0))
        }
    }

    #[derive(Clone, Default)]
    struct StubImageWriter {
        written: Arc<Mutex<Vec<(PathBuf, Frame)>>>,
    }

    impl ImageWriter for StubImageWriter {
        fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), frame.clone()));
            Ok(())
        }
    }

    /// Eyes level across row 240 of a 640x480 frame centred on `center_x`,
    /// or no face at all.
    struct StubBackend {
        face: bool,
        center_x: f64,
        loads: Arc<AtomicUsize>,
    }

    impl LandmarkBackend for StubBackend {
        fn prepare(&mut self, _backend: Backend) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }

        fn load_model(
            &mut self,
            _options: &ModelOptions,
        ) -> Result<Box<dyn LandmarkModel>, Box<dyn std::error::Error>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubModel {
                face: self.face,
                center_x: self.center_x,
            }))
        }
    }

    struct StubModel {
        face: bool,
        center_x: f64,
    }

    impl LandmarkModel for StubModel {
        fn estimate_faces(
            &mut self,
            _frame: &Frame,
        ) -> Result<Vec<FaceMesh>, Box<dyn std::error::Error>> {
            if !self.face {
                return Ok(Vec::new());
            }
            let cx = self.center_x;
            let mut mesh = vec![DVec3::new(cx, 240.0, 0.0); 468];
            mesh[LEFT_EYE_INDEX] = DVec3::new(cx - 70.0, 240.0, 0.0);
            mesh[RIGHT_EYE_INDEX] = DVec3::new(cx + 70.0, 240.0, 0.0);
            mesh[EYE_CENTER_INDEX] = DVec3::new(cx, 240.0, 0.0);
            Ok(vec![mesh])
        }
    }

    struct SolidLoader {
        loads: Arc<AtomicUsize>,
    }

    impl AssetLoader for SolidLoader {
        fn load(&self, _url: &str) -> Result<OverlayTexture, Box<dyn std::error::Error>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(OverlayTexture::new(2, 2, [0, 255, 0, 255].repeat(4)))
        }
    }

    // --- Helpers ---

    struct Counters {
        model_loads: Arc<AtomicUsize>,
        asset_loads: Arc<AtomicUsize>,
    }

    fn use_case(face: bool, writer: StubImageWriter) -> (TryOnImageUseCase, Counters) {
        use_case_at(face, 320.0, writer)
    }

    fn use_case_at(
        face: bool,
        center_x: f64,
        writer: StubImageWriter,
    ) -> (TryOnImageUseCase, Counters) {
        let counters = Counters {
            model_loads: Arc::new(AtomicUsize::new(0)),
            asset_loads: Arc::new(AtomicUsize::new(0)),
        };
        let detector = LandmarkDetector::new(
            Box::new(StubBackend {
                face,
                center_x,
                loads: counters.model_loads.clone(),
            }),
            Backend::Cpu,
            ModelOptions {
                max_faces: 1,
                iris_detail: false,
            },
        );
        let renderer = GlassesRenderer::new(
            Box::new(SolidLoader {
                loads: counters.asset_loads.clone(),
            }),
            Box::new(|_, _| Box::new(CpuRenderContext::new()) as Box<dyn RenderContext>),
        );
        let uc = TryOnImageUseCase::new(
            Box::new(StubReader {
                width: 640,
                height: 480,
            }),
            Box::new(writer),
            detector,
            Box::new(renderer),
            ArProduct::glasses("aviator", "aviator.png"),
            ArSettings::default(),
        );
        (uc, counters)
    }

    fn rgb_at(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    // --- Tests ---

    #[test]
    fn test_overlay_composited_at_face_center() {
        let writer = StubImageWriter::default();
        let written = writer.written.clone();
        let (mut uc, _) = use_case(true, writer);

        let found = uc
            .execute(Path::new("in.png"), Path::new("out.png"))
            .unwrap();

        assert!(found);
        let written = written.lock().unwrap();
        let frame = &written[0].1;
        assert_eq!((frame.width(), frame.height()), (640, 480));
        assert_eq!(rgb_at(frame, 320, 240), [0, 255, 0]);
        assert_eq!(rgb_at(frame, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_off_center_face_gets_overlay_on_its_own_side() {
        let writer = StubImageWriter::default();
        let written = writer.written.clone();
        let (mut uc, _) = use_case_at(true, 160.0, writer);

        uc.execute(Path::new("in.png"), Path::new("out.png"))
            .unwrap();

        let written = written.lock().unwrap();
        let frame = &written[0].1;
        assert_eq!(rgb_at(frame, 160, 240), [0, 255, 0]);
        assert_eq!(rgb_at(frame, 480, 240), [0, 0, 0]);
    }

    #[test]
    fn test_no_face_still_writes_image() {
        let writer = StubImageWriter::default();
        let written = writer.written.clone();
        let (mut uc, _) = use_case(false, writer);

        let found = uc
            .execute(Path::new("in.png"), Path::new("out.png"))
            .unwrap();

        assert!(!found);
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].1.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_model_and_product_load_once_across_images() {
        let (mut uc, counters) = use_case(true, StubImageWriter::default());

        uc.execute(Path::new("a.png"), Path::new("a-out.png"))
            .unwrap();
        uc.execute(Path::new("b.png"), Path::new("b-out.png"))
            .unwrap();

        assert_eq!(counters.model_loads.load(Ordering::SeqCst), 1);
        assert_eq!(counters.asset_loads.load(Ordering::SeqCst), 1);
    }
}
