use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{Detection, Frame, FrameData, FrameSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("video source unavailable: {0}")]
    Unavailable(String),
    #[error("frame {frame} could not be decoded: {reason}")]
    Decode { frame: u64, reason: String },
}

/// Opens a video for one approach.
///
/// - directory: ordered image frames (jpg/png), decoded on demand
/// - `.jsonl`: clip with detections recorded per frame
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequence::open(path)?));
    }
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "jsonl" => Ok(Box::new(AnnotatedClip::open(path)?)),
        _ => Err(SourceError::Unavailable(format!("unsupported video format: {}", path.display()))),
    }
}

pub struct ImageSequence {
    files: VecDeque<PathBuf>,
    index: u64,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let rd = std::fs::read_dir(dir)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", dir.display(), e)))?;
        let mut files: Vec<PathBuf> = rd
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        if files.is_empty() {
            return Err(SourceError::Unavailable(format!("{}: no frames", dir.display())));
        }
        files.sort();
        debug!("source: {} frames in {}", files.len(), dir.display());
        Ok(Self { files: files.into(), index: 0 })
    }
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("jpg" | "jpeg" | "png")
    )
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.files.pop_front() else { return Ok(None); };
        let img = image::open(&path).map_err(|e| SourceError::Decode {
            frame: self.index,
            reason: format!("{}: {}", path.display(), e),
        })?;
        let frame = Frame { index: self.index, data: FrameData::Image(img.to_rgb8()) };
        self.index += 1;
        Ok(Some(frame))
    }
}

#[derive(Debug, Deserialize)]
struct ClipLine {
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct AnnotatedClip {
    lines: Lines<BufReader<File>>,
    index: u64,
}

impl AnnotatedClip {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let f = File::open(path).map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self { lines: BufReader::new(f).lines(), index: 0 })
    }
}

impl FrameSource for AnnotatedClip {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            let Some(line) = self.lines.next() else { return Ok(None); };
            let line = line.map_err(|e| SourceError::Decode { frame: self.index, reason: e.to_string() })?;
            if line.trim().is_empty() { continue; }

            let parsed: ClipLine = serde_json::from_str(&line)
                .map_err(|e| SourceError::Decode { frame: self.index, reason: e.to_string() })?;
            let frame = Frame { index: self.index, data: FrameData::Annotated(parsed.detections) };
            self.index += 1;
            return Ok(Some(frame));
        }
    }
}

/// Scripted in-memory clip.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: VecDeque<Vec<Detection>>,
    index: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames: frames.into(), index: 0 }
    }

    /// `count` stationary vehicles, visible for `frames` frames.
    pub fn with_vehicles(count: usize, frames: usize) -> Self {
        let dets: Vec<Detection> = (0..count)
            .map(|i| {
                let x = (i % 10) as f32 * 60.0;
                let y = (i / 10) as f32 * 60.0;
                Detection::new(x, y, x + 40.0, y + 40.0, "car", 0.9)
            })
            .collect();
        Self::new(vec![dets; frames])
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(dets) = self.frames.pop_front() else { return Ok(None); };
        let frame = Frame { index: self.index, data: FrameData::Annotated(dets) };
        self.index += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flow-vision-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn annotated_clip_reads_frames_in_order() {
        let dir = scratch("clip");
        let path = dir.join("north.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"detections":[{{"x1":0,"y1":0,"x2":10,"y2":10,"label":"car","conf":0.9}}]}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"detections":[]}}"#).unwrap();
        writeln!(f, r#"{{}}"#).unwrap();
        drop(f);

        let mut src = open_source(&path).unwrap();
        let mut counts = vec![];
        while let Some(frame) = src.next_frame().unwrap() {
            match frame.data {
                FrameData::Annotated(d) => counts.push((frame.index, d.len())),
                FrameData::Image(_) => panic!("unexpected image frame"),
            }
        }
        assert_eq!(counts, vec![(0, 1), (1, 0), (2, 0)]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_clip_line_is_a_decode_error() {
        let dir = scratch("bad");
        let path = dir.join("east.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        let mut src = open_source(&path).unwrap();
        assert!(matches!(src.next_frame(), Err(SourceError::Decode { frame: 0, .. })));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_or_unsupported_sources_are_unavailable() {
        let dir = scratch("missing");
        assert!(matches!(open_source(&dir.join("nope.jsonl")), Err(SourceError::Unavailable(_))));
        assert!(matches!(open_source(&dir.join("clip.mp4")), Err(SourceError::Unavailable(_))));
        // empty directory has no frames
        assert!(matches!(open_source(&dir), Err(SourceError::Unavailable(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn image_sequence_decodes_sorted_frames() {
        let dir = scratch("frames");
        for (name, shade) in [("0002.png", 200u8), ("0001.png", 100u8)] {
            let img = image::RgbImage::from_pixel(4, 3, image::Rgb([shade, shade, shade]));
            img.save(dir.join(name)).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut src = open_source(&dir).unwrap();
        let first = src.next_frame().unwrap().unwrap();
        match first.data {
            FrameData::Image(img) => {
                assert_eq!(img.dimensions(), (4, 3));
                assert_eq!(img.get_pixel(0, 0)[0], 100);
            }
            FrameData::Annotated(_) => panic!("expected pixels"),
        }
        assert_eq!(src.next_frame().unwrap().unwrap().index, 1);
        assert!(src.next_frame().unwrap().is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_source_scripts_vehicles() {
        let mut src = MemorySource::with_vehicles(3, 2);
        assert_eq!(src.remaining(), 2);
        let f = src.next_frame().unwrap().unwrap();
        match f.data {
            FrameData::Annotated(d) => assert_eq!(d.len(), 3),
            FrameData::Image(_) => unreachable!(),
        }
    }
}
