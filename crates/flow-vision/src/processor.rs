use std::sync::atomic::{AtomicBool, Ordering};

use flow_proto::Approach;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    source::SourceError, Admission, BoundingBox, CentroidTracker, Detector, FlowPolicy, FrameSource,
    LabelClass, VisionConfig, Vocabulary,
};

/// Cooperative stop flag, polled once per frame.
pub trait StopCheck: Send + Sync {
    fn should_stop(&self) -> bool;
}

impl StopCheck for AtomicBool {
    fn should_stop(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("detector failed: {0}")]
    Detector(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<SourceError> for ProcessError {
    fn from(e: SourceError) -> Self {
        ProcessError::SourceUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadOrigin {
    Video,
    NoVideo,
    Fallback,
}

/// Finalized outcome of one approach's video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadResult {
    pub approach: Approach,
    pub green_s: u32,
    pub emergency: bool,
    pub max_count: usize,
    pub origin: RoadOrigin,
}

impl RoadResult {
    pub const DEFAULT_GREEN_S: u32 = 10;

    pub fn fallback(approach: Approach, origin: RoadOrigin) -> Self {
        Self { approach, green_s: Self::DEFAULT_GREEN_S, emergency: false, max_count: 0, origin }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoadStats {
    pub frames: u64,
    pub tracked: u64,
    pub ignored: u64,
    pub low_conf: u64,
    pub emergency_frames: u64,
}

pub struct RoadProcessor {
    approach: Approach,
    vocab: Vocabulary,
    policy: FlowPolicy,
    tracker: CentroidTracker,
    max_count: usize,
    emergency: bool,
    stats: RoadStats,
}

impl RoadProcessor {
    pub fn new(approach: Approach, cfg: &VisionConfig) -> Self {
        Self {
            approach,
            vocab: cfg.vocabulary.clone(),
            policy: cfg.flow,
            tracker: CentroidTracker::new(cfg.tracker.clone()),
            max_count: 0,
            emergency: false,
            stats: RoadStats::default(),
        }
    }

    pub fn stats(&self) -> &RoadStats {
        &self.stats
    }

    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn Detector,
        stop: &dyn StopCheck,
    ) -> Result<RoadResult, ProcessError> {
        info!("road {}: processing", self.approach);

        loop {
            if stop.should_stop() {
                debug!("road {}: stop requested after {} frames", self.approach, self.stats.frames);
                return Err(ProcessError::Cancelled);
            }
            let Some(frame) = source.next_frame()? else { break; };
            let dets = detector
                .detect(&frame)
                .map_err(|e| ProcessError::Detector(format!("frame {}: {:#}", frame.index, e)))?;
            self.step(&dets);
        }

        let green_s = self.policy.green_seconds(self.max_count);
        let s = &self.stats;
        info!(
            "road {}: frames={} max_count={} green={}s emergency={} (tracked={} ignored={} low_conf={})",
            self.approach, s.frames, self.max_count, green_s, self.emergency, s.tracked, s.ignored, s.low_conf
        );
        if s.frames == 0 {
            warn!("road {}: video had no frames", self.approach);
        }

        Ok(RoadResult {
            approach: self.approach,
            green_s,
            emergency: self.emergency,
            max_count: self.max_count,
            origin: RoadOrigin::Video,
        })
    }

    fn step(&mut self, dets: &[crate::Detection]) {
        self.stats.frames += 1;
        let mut boxes: Vec<BoundingBox> = Vec::with_capacity(dets.len());
        let mut emergency_here = false;

        for d in dets {
            match self.vocab.admit(d) {
                Admission::Tracked(class) => {
                    boxes.push(d.bbox);
                    self.stats.tracked += 1;
                    if class == LabelClass::Emergency {
                        emergency_here = true;
                    }
                }
                Admission::LowConfidence => self.stats.low_conf += 1,
                Admission::Ignored => {
                    self.stats.ignored += 1;
                    debug!("road {}: ignored label {:?}", self.approach, d.label);
                }
            }
        }

        if emergency_here {
            self.stats.emergency_frames += 1;
            if !self.emergency {
                warn!("road {}: emergency vehicle detected", self.approach);
            }
            self.emergency = true;
        }

        let objects = self.tracker.update(&boxes);
        self.max_count = self.max_count.max(objects.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::AnnotationDetector;
    use crate::source::MemorySource;
    use crate::{Detection, Frame};

    fn run(frames: Vec<Vec<Detection>>) -> (Result<RoadResult, ProcessError>, RoadStats) {
        let mut p = RoadProcessor::new(Approach::South, &VisionConfig::default());
        let mut src = MemorySource::new(frames);
        let mut det = AnnotationDetector::new();
        let stop = AtomicBool::new(false);
        let r = p.run(&mut src, &mut det, &stop);
        (r, p.stats().clone())
    }

    #[test]
    fn no_detections_gives_minimum_green() {
        let (r, stats) = run(vec![vec![]; 20]);
        let r = r.unwrap();
        assert_eq!(r.max_count, 0);
        assert_eq!(r.green_s, 10);
        assert!(!r.emergency);
        assert_eq!(stats.frames, 20);
    }

    #[test]
    fn running_max_of_concurrent_vehicles() {
        let mut src = MemorySource::with_vehicles(12, 3);
        let mut frames = vec![];
        while let Some(Frame { data: crate::FrameData::Annotated(d), .. }) = src.next_frame().unwrap() {
            frames.push(d);
        }
        // fewer vehicles later does not lower the max
        frames.push(frames[0][..4].to_vec());
        let (r, _) = run(frames);
        let r = r.unwrap();
        assert_eq!(r.max_count, 12);
        assert_eq!(r.green_s, 24);
        assert_eq!(r.origin, RoadOrigin::Video);
    }

    #[test]
    fn filters_labels_and_confidence() {
        let frame = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0, "car", 0.9),
            Detection::new(100.0, 0.0, 110.0, 10.0, "car", 0.4),
            Detection::new(200.0, 0.0, 210.0, 10.0, "person", 0.99),
            Detection::new(300.0, 0.0, 310.0, 10.0, "bus", 0.7),
        ];
        let (r, stats) = run(vec![frame]);
        assert_eq!(r.unwrap().max_count, 2);
        assert_eq!(stats.tracked, 2);
        assert_eq!(stats.low_conf, 1);
        assert_eq!(stats.ignored, 1);
    }

    #[test]
    fn emergency_flag_is_sticky() {
        let frames = vec![
            vec![],
            vec![Detection::new(0.0, 0.0, 30.0, 30.0, "ambulance", 0.8)],
            vec![Detection::new(400.0, 0.0, 430.0, 30.0, "car", 0.8)],
            vec![],
        ];
        let (r, stats) = run(frames);
        let r = r.unwrap();
        assert!(r.emergency);
        assert_eq!(stats.emergency_frames, 1);
        assert_eq!(r.max_count, 1);
    }

    #[test]
    fn low_confidence_emergency_does_not_flag() {
        let frames = vec![vec![Detection::new(0.0, 0.0, 30.0, 30.0, "fire engine", 0.3)]];
        let (r, _) = run(frames);
        assert!(!r.unwrap().emergency);
    }

    #[test]
    fn stop_before_first_frame_cancels() {
        let mut p = RoadProcessor::new(Approach::North, &VisionConfig::default());
        let mut src = MemorySource::with_vehicles(2, 10);
        let mut det = AnnotationDetector::new();
        let stop = AtomicBool::new(true);
        assert!(matches!(p.run(&mut src, &mut det, &stop), Err(ProcessError::Cancelled)));
        assert_eq!(src.remaining(), 10);
    }

    #[test]
    fn detector_failure_is_reported() {
        struct Broken;
        impl Detector for Broken {
            fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
                anyhow::bail!("inference crashed")
            }
        }
        let mut p = RoadProcessor::new(Approach::East, &VisionConfig::default());
        let mut src = MemorySource::with_vehicles(1, 1);
        let err = p.run(&mut src, &mut Broken, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, ProcessError::Detector(ref m) if m.contains("inference crashed")));
    }

    #[test]
    fn fallback_result_defaults() {
        let r = RoadResult::fallback(Approach::West, RoadOrigin::NoVideo);
        assert_eq!(r.green_s, 10);
        assert!(!r.emergency);
    }
}
