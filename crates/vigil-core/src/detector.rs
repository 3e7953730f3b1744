//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three strides with five-point landmarks, followed by
//! non-maximum suppression. Input frames are RGB and are letterboxed into the
//! top-left corner of the square model input.

use crate::decode::Frame;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_IOU: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}, download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in original frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth]
    pub landmarks: [(f32, f32); 5],
}

impl FaceBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &FaceBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Output tensor positions for one stride: score, bbox, keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD with keypoints has 9 outputs, model has {}",
                names.len()
            )));
        }
        let outputs = resolve_outputs(&names);
        tracing::info!(path = model_path, ?names, ?outputs, "loaded SCRFD model");

        Ok(Self { session, outputs })
    }

    /// Detect faces, sorted by descending score.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceBox>, DetectorError> {
        let (input, scale) = letterbox(frame)?;
        let layout = self.outputs;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let idx = layout[slot];
            let extract = |i: usize, what: &str| {
                outputs[i]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(idx.score, "scores")?;
            let boxes = extract(idx.bbox, "bboxes")?;
            let kps = extract(idx.kps, "kps")?;
            decode_stride(scores, boxes, kps, stride, scale, &mut candidates);
        }

        Ok(nms(candidates, SCRFD_NMS_IOU))
    }
}

/// Map output names like `score_8` / `bbox_16` / `kps_32` to stride slots,
/// falling back to the insightface export order (scores, bboxes, kps).
fn resolve_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| {
            Some(StrideOutputs {
                score: position("score", s)?,
                bbox: position("bbox", s)?,
                kps: position("kps", s)?,
            })
        })
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => std::array::from_fn(|i| StrideOutputs { score: i, bbox: i + 3, kps: i + 6 }),
    }
}

/// Resize the frame to fit the model input and place it at the top-left,
/// padding the rest with the mean (which normalizes to zero).
///
/// Returns the NCHW tensor and the resize factor (model px per frame px).
fn letterbox(frame: &Frame) -> Result<(Array4<f32>, f32), DetectorError> {
    let size = SCRFD_INPUT_SIZE;
    let scale = (size as f32 / frame.width as f32).min(size as f32 / frame.height as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size as u32);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size as u32);

    let src = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| DetectorError::InferenceFailed("frame buffer does not match dimensions".into()))?;
    let resized = imageops::resize(&src, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    Ok((tensor, scale))
}

/// Decode one stride's anchors above the score threshold into `out`.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    scale: f32,
    out: &mut Vec<FaceBox>,
) {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let anchors = (grid_w * grid_h * SCRFD_ANCHORS_PER_CELL).min(scores.len());
    let s = stride as f32;

    for idx in 0..anchors {
        let score = scores[idx];
        if score < SCRFD_SCORE_THRESHOLD {
            continue;
        }
        let (Some(b), Some(k)) = (boxes.get(idx * 4..idx * 4 + 4), kps.get(idx * 10..idx * 10 + 10)) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid_w) as f32 * s;
        let ay = (cell / grid_w) as f32 * s;

        let landmarks: [(f32, f32); 5] =
            std::array::from_fn(|i| ((ax + k[i * 2] * s) / scale, (ay + k[i * 2 + 1] * s) / scale));

        out.push(FaceBox {
            x1: (ax - b[0] * s) / scale,
            y1: (ay - b[1] * s) / scale,
            x2: (ax + b[2] * s) / scale,
            y2: (ay + b[3] * s) / scale,
            score,
            landmarks,
        });
    }
}

/// Greedy non-maximum suppression; result is sorted by descending score.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<FaceBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
