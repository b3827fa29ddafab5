use std::time::Duration;

use flow_proto::Approach;
use flow_vision::RoadResult;

use crate::PhaseTimings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachState {
    Unset,
    Processing,
    Ready,
    Green,
    Yellow,
    Red,
}

/// Lamp lit on the approach's signal head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lamp {
    Off,
    Red,
    Yellow,
    Green,
}

impl ApproachState {
    pub fn signal(self) -> Lamp {
        match self {
            ApproachState::Unset => Lamp::Off,
            ApproachState::Processing | ApproachState::Ready | ApproachState::Red => Lamp::Red,
            ApproachState::Yellow => Lamp::Yellow,
            ApproachState::Green => Lamp::Green,
        }
    }

    pub fn is_lit(self) -> bool {
        matches!(self, ApproachState::Green | ApproachState::Yellow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Acquiring,
    Sequencing,
    Completed,
    Cancelled,
    Failed(String),
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Acquiring | RunState::Sequencing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoadSlot {
    pub state: ApproachState,
    pub result: Option<RoadResult>,
}

impl Default for RoadSlot {
    fn default() -> Self {
        Self { state: ApproachState::Unset, result: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionState {
    pub roads: [RoadSlot; 4],
    pub active: Option<Approach>,
    pub run: RunState,
}

impl Default for JunctionState {
    fn default() -> Self {
        Self { roads: Default::default(), active: None, run: RunState::Idle }
    }
}

impl JunctionState {
    pub fn road(&self, a: Approach) -> &RoadSlot {
        &self.roads[a.index()]
    }

    pub(crate) fn road_mut(&mut self, a: Approach) -> &mut RoadSlot {
        &mut self.roads[a.index()]
    }

    /// Approaches currently showing green or yellow. At most one during a run.
    pub fn lit(&self) -> Vec<Approach> {
        Approach::ALL.into_iter().filter(|a| self.road(*a).state.is_lit()).collect()
    }

    pub fn all_ready(&self) -> bool {
        self.roads.iter().all(|r| r.result.is_some())
    }

    /// Green time per approach, default green for approaches without a result.
    pub fn green_times(&self) -> [u32; 4] {
        let mut out = [RoadResult::DEFAULT_GREEN_S; 4];
        for (i, slot) in self.roads.iter().enumerate() {
            if let Some(r) = &slot.result {
                out[i] = r.green_s;
            }
        }
        out
    }

    /// Wall time of the sequencing pass: all greens, one yellow per approach,
    /// and a gap between consecutive approaches.
    pub fn scripted_duration(&self, timing: &PhaseTimings) -> Duration {
        let green: u64 = self.green_times().iter().map(|g| *g as u64).sum();
        let n = self.roads.len() as u64;
        Duration::from_secs(green + n * timing.yellow_s as u64 + (n - 1) * timing.gap_s as u64)
    }
}
