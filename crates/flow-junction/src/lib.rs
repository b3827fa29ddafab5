pub mod cancel;
mod controller;
pub mod doctor;
pub mod sources;
pub mod state;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flow_proto::{EventKind, JunctionEvent};
use flow_vision::{init_detector, Detector, VisionConfig};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cancel::{stop_pair, StopHandle};
use controller::{Controller, Shared};
pub use sources::{PathSources, SourceProvider};
pub use state::{ApproachState, JunctionState, Lamp, RoadSlot, RunState};

const EVENT_BUFFER: usize = 256;
/// Upper bound on a cancellable wait; a stop request is honoured within it.
pub const MAX_TICK_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PhaseTimings {
    pub yellow_s: u32,
    /// All-red pause between consecutive approaches.
    pub gap_s: u32,
    /// Granularity of cancellable waits, capped at [`MAX_TICK_MS`].
    pub tick_ms: u64,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self { yellow_s: 5, gap_s: 2, tick_ms: 500 }
    }
}

impl PhaseTimings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.clamp(1, MAX_TICK_MS))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JunctionConfig {
    pub vision: VisionConfig,
    pub timing: PhaseTimings,
}

#[derive(Debug, Error)]
pub enum JunctionError {
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("a junction run is already in progress")]
    AlreadyRunning,
    #[error("junction was cancelled; reset it before starting again")]
    NeedsReset,
}

/// Control-side handle of one four-way junction.
///
/// Runs the acquisition and phase sequence on a background task; progress is
/// reported through the event receiver returned by [`Junction::new`] and the
/// [`Junction::state`] snapshot.
pub struct Junction {
    cfg: JunctionConfig,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::Sender<JunctionEvent>,
    stop: StopHandle,
    task: Option<JoinHandle<RunState>>,
}

impl Junction {
    /// The receiver is bounded. Phase changes and terminal events wait for
    /// room, so a subscriber that stops reading stalls the run at its next
    /// phase change; countdown ticks are dropped instead of waiting.
    /// Dropping the receiver is fine, events are then discarded.
    pub fn new(cfg: JunctionConfig) -> (Self, mpsc::Receiver<JunctionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (stop, _) = stop_pair();
        let j = Self { cfg, shared: Arc::new(Mutex::new(Shared::default())), events: tx, stop, task: None };
        (j, rx)
    }

    pub fn config(&self) -> &JunctionConfig {
        &self.cfg
    }

    pub fn state(&self) -> JunctionState {
        self.shared.lock().unwrap_or_else(|e| e.into_inner()).state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Starts a run with the configured detector backend.
    pub async fn start(&mut self, sources: impl SourceProvider + 'static) -> Result<(), JunctionError> {
        self.check_startable()?;
        let detector = match init_detector(&self.cfg.vision) {
            Ok(d) => d,
            Err(e) => {
                let msg = e.to_string();
                warn!("junction: {}", msg);
                self.with_state(|s| s.run = RunState::Failed(msg.clone()));
                self.emit(JunctionEvent::junction(EventKind::ModelUnavailable, msg.clone())).await;
                return Err(JunctionError::ModelUnavailable(msg));
            }
        };
        self.start_with(sources, detector).await
    }

    /// Starts a run with a caller-supplied detector.
    pub async fn start_with(
        &mut self,
        sources: impl SourceProvider + 'static,
        detector: Box<dyn Detector>,
    ) -> Result<(), JunctionError> {
        self.check_startable()?;

        let generation = {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            shared.state = JunctionState::default();
            shared.generation
        };
        info!("junction: starting run (generation {})", generation);
        self.emit(JunctionEvent::junction(EventKind::Started, "Traffic control started")).await;

        let ctl = Controller::new(self.cfg.clone(), self.shared.clone(), generation, self.events.clone(), self.stop.token());
        self.task = Some(tokio::spawn(ctl.run(Box::new(sources), detector)));
        Ok(())
    }

    /// Requests the current run to stop at its next suspension point.
    /// The junction stays stopped until [`Junction::reset`].
    pub fn cancel(&self) {
        if !self.stop.is_cancelled() {
            info!("junction: cancel requested");
        }
        self.stop.cancel();
    }

    /// Waits for the current run to end.
    pub async fn join(&mut self) -> Option<RunState> {
        let task = self.task.take()?;
        match task.await {
            Ok(end) => Some(end),
            Err(e) => {
                warn!("junction: control task failed: {}", e);
                let end = RunState::Failed(e.to_string());
                self.with_state(|s| s.run = end.clone());
                Some(end)
            }
        }
    }

    /// Stops any run, clears all per-approach state and re-arms the stop signal.
    pub async fn reset(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            // the old run may outlive this call; the generation bump fences its writes
            if tokio::time::timeout(self.cfg.timing.tick() * 4, task).await.is_err() {
                warn!("junction: previous run still winding down");
            }
        }
        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            shared.generation += 1;
            shared.state = JunctionState::default();
        }
        let (stop, _) = stop_pair();
        self.stop = stop;
        info!("junction: reset");
        self.emit(JunctionEvent::junction(EventKind::Reset, "Status reset")).await;
    }

    fn check_startable(&self) -> Result<(), JunctionError> {
        if self.is_running() {
            return Err(JunctionError::AlreadyRunning);
        }
        if self.stop.is_cancelled() {
            return Err(JunctionError::NeedsReset);
        }
        Ok(())
    }

    fn with_state(&self, f: impl FnOnce(&mut JunctionState)) {
        f(&mut self.shared.lock().unwrap_or_else(|e| e.into_inner()).state);
    }

    async fn emit(&self, ev: JunctionEvent) {
        let _ = self.events.send(ev).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_capped() {
        let mut t = PhaseTimings::default();
        assert_eq!(t.tick(), Duration::from_millis(500));
        t.tick_ms = 5000;
        assert_eq!(t.tick(), Duration::from_millis(MAX_TICK_MS));
        t.tick_ms = 0;
        assert_eq!(t.tick(), Duration::from_millis(1));
    }
}
