use anyhow::Result;
use thiserror::Error;
use tracing::info;

use crate::{Detection, Detector, Frame, FrameData, VisionConfig};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("detection model unavailable: {0}")]
    Unavailable(String),
}

/// Detector for clips whose detections were recorded offline.
/// Raw pixel frames need a model backend and are rejected.
#[derive(Debug, Default)]
pub struct AnnotationDetector {
    frames_seen: u64,
}

impl AnnotationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Detector for AnnotationDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        match &frame.data {
            FrameData::Annotated(dets) => Ok(dets.clone()),
            FrameData::Image(img) => anyhow::bail!(
                "frame {} is raw pixels ({}x{}); backend \"annotations\" needs recorded detections",
                frame.index,
                img.width(),
                img.height()
            ),
        }
    }
}

pub fn init_detector(cfg: &VisionConfig) -> Result<Box<dyn Detector>, ModelError> {
    match cfg.backend.as_str() {
        "annotations" => {
            info!("vision: using recorded annotations as detector output");
            Ok(Box::new(AnnotationDetector::new()))
        }
        other => Err(ModelError::Unavailable(format!("unknown vision.backend: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_recorded_detections_through() {
        let mut d = AnnotationDetector::new();
        let frame = Frame {
            index: 7,
            data: FrameData::Annotated(vec![Detection::new(0.0, 0.0, 4.0, 4.0, "truck", 0.8)]),
        };
        let out = d.detect(&frame).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "truck");
        assert_eq!(d.frames_seen(), 1);
    }

    #[test]
    fn rejects_pixel_frames() {
        let mut d = AnnotationDetector::new();
        let frame = Frame { index: 0, data: FrameData::Image(image::RgbImage::new(2, 2)) };
        let err = d.detect(&frame).unwrap_err();
        assert!(err.to_string().contains("raw pixels"));
    }

    #[test]
    fn unknown_backend_is_model_unavailable() {
        let cfg = VisionConfig { backend: "yolo-gpu".into(), ..VisionConfig::default() };
        assert!(matches!(init_detector(&cfg), Err(ModelError::Unavailable(_))));
        assert!(init_detector(&VisionConfig::default()).is_ok());
    }
}
