use std::path::PathBuf;

use flow_proto::Approach;
use flow_vision::{open_source, FrameSource, SourceError};
use tracing::info;

pub type Selection = Option<Result<Box<dyn FrameSource>, SourceError>>;

/// Supplies the video for each approach. Called once per approach, in visiting
/// order, from a blocking thread; `None` means no video was supplied.
pub trait SourceProvider: Send {
    fn select(&mut self, approach: Approach) -> Selection;
}

impl<F> SourceProvider for F
where
    F: FnMut(Approach) -> Selection + Send,
{
    fn select(&mut self, approach: Approach) -> Selection {
        self(approach)
    }
}

/// Video paths fixed up front, one optional path per approach.
#[derive(Debug, Clone, Default)]
pub struct PathSources {
    paths: [Option<PathBuf>; 4],
}

impl PathSources {
    pub fn new(paths: [Option<PathBuf>; 4]) -> Self {
        Self { paths }
    }

    pub fn set(&mut self, approach: Approach, path: Option<PathBuf>) {
        self.paths[approach.index()] = path;
    }

    pub fn get(&self, approach: Approach) -> Option<&PathBuf> {
        self.paths[approach.index()].as_ref()
    }
}

impl SourceProvider for PathSources {
    fn select(&mut self, approach: Approach) -> Selection {
        let path = self.paths[approach.index()].as_ref()?;
        info!("sources: {} -> {}", approach, path.display());
        Some(open_source(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_no_video() {
        let mut s = PathSources::default();
        s.set(Approach::South, Some(PathBuf::from("/definitely/not/here.jsonl")));
        assert!(s.select(Approach::North).is_none());
        assert!(matches!(s.select(Approach::South), Some(Err(SourceError::Unavailable(_)))));
        assert!(s.get(Approach::South).is_some());
    }
}
