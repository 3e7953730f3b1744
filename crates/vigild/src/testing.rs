//! Test doubles shared by the daemon's unit tests.

use crate::audit::{AuditSink, SecurityEvent};
use crate::engine::{spawn_engine, EngineHandle};
use base64::Engine as _;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;
use vigil_core::{DetectionError, Embedding, EmbeddingExtractor, ExtractorError, Frame};

/// Extractor keyed on the red channel of the top-left pixel.
///
/// A key maps to the list of faces "seen" in that image; unknown keys
/// yield `NoFaceDetected`.
#[derive(Clone, Default)]
pub struct ScriptedExtractor {
    faces: HashMap<u8, Vec<Embedding>>,
    delay: Duration,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn face(mut self, key: u8, values: Vec<f32>) -> Self {
        self.faces.entry(key).or_default().push(Embedding::new(values));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl EmbeddingExtractor for ScriptedExtractor {
    fn extract(&mut self, frame: &Frame) -> Result<Vec<Embedding>, ExtractorError> {
        std::thread::sleep(self.delay);
        match self.faces.get(&frame.pixel(0, 0)[0]) {
            Some(faces) if !faces.is_empty() => Ok(faces.clone()),
            _ => Err(DetectionError::NoFaceDetected.into()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Two workers running clones of `extractor`.
pub fn engine(extractor: ScriptedExtractor, timeout: Duration) -> EngineHandle {
    let workers: Vec<Box<dyn EmbeddingExtractor>> =
        vec![Box::new(extractor.clone()), Box::new(extractor)];
    spawn_engine(workers, timeout).unwrap()
}

/// A 2×2 PNG whose pixels all carry `key` in the red channel.
pub fn png_with_key(key: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([key, 0, 0]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Unit-length-ish vector along one axis, for readable distances.
pub fn axis(dim: usize, i: usize, v: f32) -> Vec<f32> {
    let mut values = vec![0.0; dim];
    values[i] = v;
    values
}

#[derive(Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryAudit {
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: &SecurityEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
