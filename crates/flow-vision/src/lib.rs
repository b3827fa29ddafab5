pub mod detector;
pub mod flow;
pub mod processor;
pub mod source;
pub mod tracker;
pub mod vocab;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use detector::{init_detector, ModelError};
pub use flow::{estimate, FlowPolicy};
pub use processor::{ProcessError, RoadOrigin, RoadProcessor, RoadResult, StopCheck};
pub use source::{open_source, SourceError};
pub use tracker::{CentroidTracker, ObjectId, TrackerConfig};
pub use vocab::{Admission, LabelClass, Vocabulary};

/// Axis-aligned box in frame-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Swap corners so that x1 <= x2 and y1 <= y2.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn centroid(&self) -> Centroid {
        let b = self.normalized();
        Centroid {
            x: ((b.x1 + b.x2) / 2.0).round() as i32,
            y: ((b.y1 + b.y2) / 2.0).round() as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl Centroid {
    pub fn distance(&self, other: &Centroid) -> f64 {
        // widen before subtracting; saturated centroids sit at i32::MIN/MAX
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub label: String,
    pub conf: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, label: &str, conf: f32) -> Self {
        Self { bbox: BoundingBox::new(x1, y1, x2, y2), label: label.to_string(), conf }
    }
}

#[derive(Debug, Clone)]
pub enum FrameData {
    Image(image::RgbImage),
    // detections recorded alongside the clip by an offline model run
    Annotated(Vec<Detection>),
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub data: FrameData,
}

/// Opaque object-detection model: frame in, labelled boxes out.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Finite, ordered sequence of frames. `Ok(None)` means the video is exhausted.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, SourceError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub backend: String, // "annotations"
    pub vocabulary: Vocabulary,
    pub tracker: TrackerConfig,
    pub flow: FlowPolicy,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            backend: "annotations".into(),
            vocabulary: Vocabulary::default(),
            tracker: TrackerConfig::default(),
            flow: FlowPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_normalizes_inverted_box() {
        let a = BoundingBox::new(90.0, 90.0, 110.0, 110.0).centroid();
        let b = BoundingBox::new(110.0, 110.0, 90.0, 90.0).centroid();
        assert_eq!(a, Centroid { x: 100, y: 100 });
        assert_eq!(a, b);
    }

    #[test]
    fn centroid_rounds_to_integer() {
        let c = BoundingBox::new(0.0, 0.0, 5.0, 3.0).centroid();
        assert_eq!(c, Centroid { x: 3, y: 2 });
    }

    #[test]
    fn detection_json_is_flat() {
        let d: Detection =
            serde_json::from_str(r#"{"x1":1,"y1":2,"x2":3,"y2":4,"label":"car","conf":0.9}"#).unwrap();
        assert_eq!(d.bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(d.label, "car");
    }
}
