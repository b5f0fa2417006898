/// Face mesh landmark backend using ONNX Runtime via `ort`.
///
/// Two-stage: a BlazeFace short-range detector finds face boxes, then the
/// face mesh model regresses 468 (or 478 with iris refinement) points on a
/// square crop around each box.
use std::path::PathBuf;

use glam::DVec3;

use crate::detection::domain::landmark_model::{
    Backend, FaceMesh, LandmarkBackend, LandmarkModel, ModelOptions,
};
use crate::detection::infrastructure::execution_provider::execution_providers_for;
use crate::shared::constants::{
    FACE_DETECTOR_MODEL_NAME, FACE_MESH_IRIS_MODEL_NAME, FACE_MESH_IRIS_POINTS,
    FACE_MESH_MODEL_NAME, FACE_MESH_POINTS,
};
use crate::shared::frame::Frame;
use crate::shared::model_resolver::{self, ModelLocation};

/// BlazeFace model input resolution.
const DETECTOR_INPUT_SIZE: u32 = 128;

/// Face mesh model input resolution.
const MESH_INPUT_SIZE: u32 = 192;

/// Default BlazeFace confidence threshold.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Minimum face-presence score for a mesh to be kept.
const FACE_PRESENCE_THRESH: f32 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Crop side relative to the detector box's longer side.
const CROP_SCALE: f64 = 1.5;

/// Resolves model files and builds ONNX sessions on the selected backend.
pub struct OnnxFaceMeshBackend {
    location: ModelLocation,
    confidence: f64,
    backend: Option<Backend>,
}

impl OnnxFaceMeshBackend {
    pub fn new(location: ModelLocation) -> Self {
        Self {
            location,
            confidence: DEFAULT_CONFIDENCE,
            backend: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = model_resolver::resolve(
            name,
            &self.location,
            Some(Box::new(move |done, total| {
                if total > 0 {
                    log::debug!("Downloading model: {}%", done * 100 / total);
                }
            })),
        )?;
        Ok(path)
    }

    fn session(
        &self,
        backend: Backend,
        name: &str,
    ) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
        let path = self.resolve(name)?;
        log::debug!("Loading {} on {backend}", path.display());
        let session = ort::session::Session::builder()?
            .with_execution_providers(execution_providers_for(backend))?
            .commit_from_file(&path)?;
        Ok(session)
    }
}

impl LandmarkBackend for OnnxFaceMeshBackend {
    fn prepare(&mut self, backend: Backend) -> Result<(), Box<dyn std::error::Error>> {
        // Fetch the detector now so load_model only pays for session creation.
        self.resolve(FACE_DETECTOR_MODEL_NAME)?;
        self.backend = Some(backend);
        Ok(())
    }

    fn load_model(
        &mut self,
        options: &ModelOptions,
    ) -> Result<Box<dyn LandmarkModel>, Box<dyn std::error::Error>> {
        let backend = self.backend.ok_or("backend not prepared")?;
        let (mesh_name, points) = if options.iris_detail {
            (FACE_MESH_IRIS_MODEL_NAME, FACE_MESH_IRIS_POINTS)
        } else {
            (FACE_MESH_MODEL_NAME, FACE_MESH_POINTS)
        };

        Ok(Box::new(OnnxFaceMeshModel {
            detector: self.session(backend, FACE_DETECTOR_MODEL_NAME)?,
            mesh: self.session(backend, mesh_name)?,
            anchors: generate_anchors(),
            confidence: self.confidence,
            max_faces: options.max_faces.max(1),
            points,
        }))
    }
}

/// Loaded detector + mesh sessions.
pub struct OnnxFaceMeshModel {
    detector: ort::session::Session,
    mesh: ort::session::Session,
    anchors: Vec<[f32; 2]>,
    confidence: f64,
    max_faces: usize,
    points: usize,
}

impl OnnxFaceMeshModel {
    fn detect_boxes(&mut self, frame: &Frame) -> Result<Vec<RawDet>, Box<dyn std::error::Error>> {
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;
        let full = CropRegion {
            x: 0.0,
            y: 0.0,
            width: frame.width() as f64,
            height: frame.height() as f64,
        };

        let input_tensor = preprocess(frame, &full, DETECTOR_INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.detector.run(ort::inputs![input_value])?;

        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = Vec::new();
        let num_anchors = self.anchors.len().min(NUM_ANCHORS);
        let input = DETECTOR_INPUT_SIZE as f32;

        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if score < self.confidence as f32 {
                continue;
            }

            let anchor = &self.anchors[i];
            let reg_offset = i * 16;
            if reg_offset + 4 > reg_data.len() {
                break;
            }

            let cx = anchor[0] + reg_data[reg_offset] / input;
            let cy = anchor[1] + reg_data[reg_offset + 1] / input;
            let w = reg_data[reg_offset + 2] / input;
            let h = reg_data[reg_offset + 3] / input;

            raw_dets.push(RawDet {
                x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
                y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
                x2: ((cx + w / 2.0) * fw).min(fw) as f64,
                y2: ((cy + h / 2.0) * fh).min(fh) as f64,
                score: score as f64,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }

    fn estimate_mesh(
        &mut self,
        frame: &Frame,
        crop: &CropRegion,
    ) -> Result<Option<FaceMesh>, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(frame, crop, MESH_INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.mesh.run(ort::inputs![input_value])?;

        if outputs.len() == 0 {
            return Err("face mesh model produced no outputs".into());
        }

        // Face-presence flag is the single-element output, when the model has one.
        for i in 1..outputs.len() {
            let flag = outputs[i].try_extract_array::<f32>()?;
            if flag.len() == 1 {
                let presence = flag.iter().next().copied().map(sigmoid).unwrap_or(1.0);
                if presence < FACE_PRESENCE_THRESH {
                    return Ok(None);
                }
                break;
            }
        }

        let landmarks = outputs[0].try_extract_array::<f32>()?;
        let raw = landmarks.as_slice().ok_or("Cannot get landmark slice")?;
        Ok(Some(decode_mesh(raw, crop, MESH_INPUT_SIZE, self.points)?))
    }
}

impl LandmarkModel for OnnxFaceMeshModel {
    fn estimate_faces(&mut self, frame: &Frame) -> Result<Vec<FaceMesh>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let boxes = self.detect_boxes(frame)?;
        let mut faces = Vec::with_capacity(boxes.len().min(self.max_faces));
        for det in boxes.iter().take(self.max_faces) {
            if let Some(mesh) = self.estimate_mesh(frame, &face_crop(det))? {
                faces.push(mesh);
            }
        }
        Ok(faces)
    }
}

// ---------------------------------------------------------------------------
// Cropping
// ---------------------------------------------------------------------------

/// Frame-space rectangle sampled into a model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CropRegion {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Square crop centered on a detection, enlarged to include the whole head.
fn face_crop(det: &RawDet) -> CropRegion {
    let cx = (det.x1 + det.x2) / 2.0;
    let cy = (det.y1 + det.y2) / 2.0;
    let side = (det.x2 - det.x1).max(det.y2 - det.y1) * CROP_SCALE;
    CropRegion {
        x: cx - side / 2.0,
        y: cy - side / 2.0,
        width: side,
        height: side,
    }
}

/// Map raw `[x, y, z, ...]` mesh output from model input space to frame pixels.
fn decode_mesh(
    raw: &[f32],
    crop: &CropRegion,
    input_size: u32,
    points: usize,
) -> Result<FaceMesh, Box<dyn std::error::Error>> {
    let available = raw.len() / 3;
    if available < FACE_MESH_POINTS {
        return Err(format!(
            "face mesh output has {available} points, expected at least {FACE_MESH_POINTS}"
        )
        .into());
    }

    let sx = crop.width / input_size as f64;
    let sy = crop.height / input_size as f64;
    Ok(raw
        .chunks_exact(3)
        .take(points.min(available))
        .map(|p| {
            DVec3::new(
                crop.x + p[0] as f64 * sx,
                crop.y + p[1] as f64 * sy,
                p[2] as f64 * sx,
            )
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Sample `region` into a `size × size` [0,1] NCHW float32 tensor.
///
/// Nearest-neighbour; samples outside the frame clamp to the border.
fn preprocess(frame: &Frame, region: &CropRegion, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let max_y = frame.height().saturating_sub(1) as f64;
    let max_x = frame.width().saturating_sub(1) as f64;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let fy = region.y + (y as f64 + 0.5) * region.height / s as f64;
        let src_y = fy.clamp(0.0, max_y) as usize;
        for x in 0..s {
            let fx = region.x + (x as f64 + 0.5) * region.width / s as f64;
            let src_x = fx.clamp(0.0, max_x) as usize;
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// 16×16 grid with 2 anchors per cell plus 8×8 grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = DETECTOR_INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

/// Highest score first; overlapping lower-scored boxes are dropped.
fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> RawDet {
        RawDet {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[test]
    fn test_preprocess_shape() {
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 0);
        let region = CropRegion {
            x: 0.0,
            y: 0.0,
            width: 200.0,
            height: 100.0,
        };
        let tensor = preprocess(&frame, &region, MESH_INPUT_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 192, 192]);
    }

    #[test]
    fn test_preprocess_clamps_out_of_frame_samples() {
        // Left half red, right half blue; crop extends past the right edge.
        let (w, h) = (20u32, 10u32);
        let mut data = vec![0u8; (w * h * 3) as usize];
        for y in 0..h {
            for x in 0..w {
                let i = ((y * w + x) * 3) as usize;
                if x < w / 2 {
                    data[i] = 255;
                } else {
                    data[i + 2] = 255;
                }
            }
        }
        let frame = Frame::new(data, w, h, 0);
        let region = CropRegion {
            x: 15.0,
            y: -5.0,
            width: 20.0,
            height: 20.0,
        };

        let tensor = preprocess(&frame, &region, 8);

        assert_relative_eq!(tensor[[0, 2, 0, 7]], 1.0);
        assert_relative_eq!(tensor[[0, 0, 7, 7]], 0.0);
    }

    #[test]
    fn test_generate_anchors_count_and_range() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors
            .iter()
            .all(|a| a[0] > 0.0 && a[0] < 1.0 && a[1] > 0.0 && a[1] < 1.0));
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_nms_suppresses_overlap_keeps_separate() {
        let mut dets = vec![
            det(5.0, 5.0, 105.0, 105.0, 0.7),
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        let kept = nms(&mut dets, NMS_IOU_THRESH);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].score, 0.9);
        assert_relative_eq!(kept[1].score, 0.8);
    }

    #[test]
    fn test_face_crop_is_square_and_enlarged() {
        let crop = face_crop(&det(100.0, 50.0, 200.0, 130.0, 0.9));
        assert_relative_eq!(crop.width, 150.0);
        assert_relative_eq!(crop.height, 150.0);
        assert_relative_eq!(crop.x + crop.width / 2.0, 150.0);
        assert_relative_eq!(crop.y + crop.height / 2.0, 90.0);
    }

    #[test]
    fn test_decode_mesh_maps_to_frame_pixels() {
        let mut raw = vec![0.0f32; FACE_MESH_POINTS * 3];
        raw[0] = 96.0;
        raw[1] = 48.0;
        raw[2] = -19.2;
        let crop = CropRegion {
            x: 100.0,
            y: 200.0,
            width: 384.0,
            height: 384.0,
        };

        let mesh = decode_mesh(&raw, &crop, MESH_INPUT_SIZE, FACE_MESH_POINTS).unwrap();

        assert_eq!(mesh.len(), FACE_MESH_POINTS);
        assert_relative_eq!(mesh[0].x, 292.0, epsilon = 1e-4);
        assert_relative_eq!(mesh[0].y, 296.0, epsilon = 1e-4);
        assert_relative_eq!(mesh[0].z, -38.4, epsilon = 1e-4);
        assert_eq!(mesh[1], DVec3::new(100.0, 200.0, 0.0));
    }

    #[test]
    fn test_decode_mesh_truncates_to_requested_points() {
        let raw = vec![0.0f32; FACE_MESH_IRIS_POINTS * 3];
        let crop = CropRegion {
            x: 0.0,
            y: 0.0,
            width: 192.0,
            height: 192.0,
        };
        let mesh = decode_mesh(&raw, &crop, MESH_INPUT_SIZE, FACE_MESH_POINTS).unwrap();
        assert_eq!(mesh.len(), FACE_MESH_POINTS);
    }

    #[test]
    fn test_decode_mesh_rejects_short_output() {
        let crop = CropRegion {
            x: 0.0,
            y: 0.0,
            width: 192.0,
            height: 192.0,
        };
        assert!(decode_mesh(&[0.0; 30], &crop, MESH_INPUT_SIZE, FACE_MESH_POINTS).is_err());
    }

    #[test]
    fn test_load_model_before_prepare_fails() {
        let mut backend = OnnxFaceMeshBackend::new(ModelLocation::default());
        let options = ModelOptions {
            max_faces: 1,
            iris_detail: false,
        };
        assert!(backend.load_model(&options).is_err());
    }
}
