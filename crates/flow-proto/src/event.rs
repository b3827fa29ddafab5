use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signal::{Approach, Phase};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Started,
    WaitingForVideo,
    Processing,
    NoVideo,
    SourceWarning,
    RoadReady { green_s: u32, emergency: bool },
    Emergency,
    SequenceStarted,
    PhaseChange { phase: Phase, remaining_s: u32 },
    Countdown { phase: Phase, remaining_s: u32 },
    Gap { seconds: u32 },
    Completed,
    Cancelled,
    Reset,
    ModelUnavailable,
}

/// Status event pushed from the control task to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub approach: Option<Approach>,
    pub msg: String,
}

impl JunctionEvent {
    pub fn new(kind: EventKind, approach: Option<Approach>, msg: impl Into<String>) -> Self {
        Self {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
            approach,
            msg: msg.into(),
        }
    }

    pub fn junction(kind: EventKind, msg: impl Into<String>) -> Self {
        Self::new(kind, None, msg)
    }

    pub fn road(kind: EventKind, approach: Approach, msg: impl Into<String>) -> Self {
        Self::new(kind, Some(approach), msg)
    }

    /// Phase shown on the approach's signal head after this event, if it changes one.
    pub fn phase(&self) -> Option<Phase> {
        match &self.kind {
            EventKind::PhaseChange { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Completed | EventKind::Cancelled | EventKind::ModelUnavailable)
    }
}

impl fmt::Display for JunctionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = time::OffsetDateTime::from_unix_timestamp_nanos(self.ts_unix_ms as i128 * 1_000_000)
            .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
        write!(f, "[{:02}:{:02}:{:02}] ", ts.hour(), ts.minute(), ts.second())?;
        if let Some(a) = self.approach {
            write!(f, "{}: ", a)?;
        }
        f.write_str(&self.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_change_serializes_with_tag() {
        let ev = JunctionEvent::road(
            EventKind::PhaseChange { phase: Phase::Green, remaining_s: 20 },
            Approach::East,
            "GREEN signal for East Road: 20 seconds",
        );
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"]["type"], "phase_change");
        assert_eq!(v["kind"]["phase"], "GREEN");
        assert_eq!(v["approach"], "east");
        assert_eq!(ev.phase(), Some(Phase::Green));
    }

    #[test]
    fn display_prefixes_approach() {
        let ev = JunctionEvent::road(EventKind::NoVideo, Approach::West, "no video selected");
        let line = ev.to_string();
        assert!(line.ends_with("West: no video selected"), "{}", line);
        assert!(!ev.is_terminal());
        assert!(JunctionEvent::junction(EventKind::Completed, "done").is_terminal());
    }
}
