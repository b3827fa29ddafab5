use std::sync::{Arc, Mutex};
use std::time::Duration;

use flow_proto::{Approach, EventKind, JunctionEvent, Phase};
use flow_vision::{Detector, FrameSource, ProcessError, RoadOrigin, RoadProcessor, RoadResult, SourceError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cancel::StopToken;
use crate::sources::{Selection, SourceProvider};
use crate::state::{ApproachState, JunctionState, RunState};
use crate::JunctionConfig;

/// State shared with the presentation layer. Only the control task writes it.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub generation: u64,
    pub state: JunctionState,
}

/// Early exit of the pipeline; not an error.
struct Stopped;

/// Free slots kept back from countdown events so phase changes and the
/// terminal event of a run always fit in the channel.
const COUNTDOWN_HEADROOM: usize = 64;

type SharedProvider = Arc<Mutex<Box<dyn SourceProvider>>>;
type SharedDetector = Arc<Mutex<Box<dyn Detector>>>;

// a panicked blocking task leaves the mutex poisoned; the data is still usable
fn relock<T: ?Sized>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) struct Controller {
    cfg: JunctionConfig,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    events: mpsc::Sender<JunctionEvent>,
    stop: StopToken,
}

impl Controller {
    pub fn new(
        cfg: JunctionConfig,
        shared: Arc<Mutex<Shared>>,
        generation: u64,
        events: mpsc::Sender<JunctionEvent>,
        stop: StopToken,
    ) -> Self {
        Self { cfg, shared, generation, events, stop }
    }

    /// Acquisition pass over all approaches, then the phase sequence.
    pub async fn run(self, provider: Box<dyn SourceProvider>, detector: Box<dyn Detector>) -> RunState {
        let provider = Arc::new(Mutex::new(provider));
        let detector = Arc::new(Mutex::new(detector));
        let outcome = match self.acquire(&provider, &detector).await {
            Ok(()) => self.sequence().await,
            Err(Stopped) => Err(Stopped),
        };

        let end = match outcome {
            Ok(()) => {
                self.emit(JunctionEvent::junction(EventKind::Completed, "Traffic control sequence completed")).await;
                RunState::Completed
            }
            Err(Stopped) => {
                info!("junction: cancelled");
                self.emit(JunctionEvent::junction(EventKind::Cancelled, "Traffic control sequence cancelled")).await;
                RunState::Cancelled
            }
        };
        // cancelled runs keep their last rendered phases
        self.update(|s| {
            s.active = None;
            s.run = end.clone();
        });
        end
    }

    async fn acquire(&self, provider: &SharedProvider, detector: &SharedDetector) -> Result<(), Stopped> {
        self.update(|s| s.run = RunState::Acquiring);

        for approach in Approach::ALL {
            self.check()?;
            self.emit(JunctionEvent::road(
                EventKind::WaitingForVideo,
                approach,
                format!("Please select video for {} Road", approach),
            ))
            .await;

            // selection may block on the operator
            let p = provider.clone();
            let selection: Selection = match tokio::task::spawn_blocking(move || relock(&*p).select(approach)).await {
                Ok(sel) => sel,
                Err(e) => Some(Err(SourceError::Unavailable(format!("source selection failed: {}", e)))),
            };
            self.check()?;

            let result = match selection {
                None => {
                    warn!("junction: no video for {} road, using default green", approach);
                    self.emit(JunctionEvent::road(
                        EventKind::NoVideo,
                        approach,
                        format!("No video selected for {} Road", approach),
                    ))
                    .await;
                    RoadResult::fallback(approach, RoadOrigin::NoVideo)
                }
                Some(Err(e)) => self.fallback(approach, &ProcessError::from(e)).await,
                Some(Ok(source)) => self.process(approach, source, detector).await?,
            };

            let (green_s, emergency) = (result.green_s, result.emergency);
            self.update(|s| {
                let slot = s.road_mut(approach);
                slot.state = ApproachState::Ready;
                slot.result = Some(result);
            });
            if emergency {
                // advisory only: phases are not reordered or shortened
                warn!("junction: emergency vehicle on {} road", approach);
                self.emit(JunctionEvent::road(
                    EventKind::Emergency,
                    approach,
                    format!("Emergency vehicle detected on {} Road", approach),
                ))
                .await;
            }
            self.emit(JunctionEvent::road(
                EventKind::RoadReady { green_s, emergency },
                approach,
                format!("{} Road Green Time: {} seconds", approach, green_s),
            ))
            .await;
        }
        Ok(())
    }

    async fn process(
        &self,
        approach: Approach,
        mut source: Box<dyn FrameSource>,
        detector: &SharedDetector,
    ) -> Result<RoadResult, Stopped> {
        self.update(|s| s.road_mut(approach).state = ApproachState::Processing);
        self.emit(JunctionEvent::road(EventKind::Processing, approach, format!("Processing {} Road", approach)))
            .await;

        let vision = self.cfg.vision.clone();
        let stop = self.stop.clone();
        let det = detector.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut proc = RoadProcessor::new(approach, &vision);
            let mut guard = relock(&*det);
            proc.run(source.as_mut(), &mut **guard, &stop)
        })
        .await;

        match joined {
            Ok(Ok(r)) => Ok(r),
            Ok(Err(ProcessError::Cancelled)) => Err(Stopped),
            Ok(Err(e)) => Ok(self.fallback(approach, &e).await),
            Err(e) => Ok(self.fallback(approach, &ProcessError::Detector(format!("processing panicked: {}", e))).await),
        }
    }

    async fn fallback(&self, approach: Approach, err: &ProcessError) -> RoadResult {
        warn!("junction: {} road: {}; using default green", approach, err);
        self.emit(JunctionEvent::road(
            EventKind::SourceWarning,
            approach,
            format!("Could not process {} Road video ({}); using {}s", approach, err, RoadResult::DEFAULT_GREEN_S),
        ))
        .await;
        RoadResult::fallback(approach, RoadOrigin::Fallback)
    }

    async fn sequence(&self) -> Result<(), Stopped> {
        self.check()?;
        let greens = self.lock().state.green_times();
        self.update(|s| s.run = RunState::Sequencing);
        info!("junction: sequencing greens={:?}", greens);
        self.emit(JunctionEvent::junction(EventKind::SequenceStarted, "Starting traffic signal sequence")).await;

        let timing = self.cfg.timing;
        for (i, approach) in Approach::ALL.into_iter().enumerate() {
            self.check()?;
            if i > 0 && timing.gap_s > 0 {
                self.emit(JunctionEvent::junction(EventKind::Gap { seconds: timing.gap_s }, "All red"))
                    .await;
                self.hold(Duration::from_secs(timing.gap_s as u64), None).await?;
            }

            let green_s = greens[approach.index()];
            self.update(|s| {
                s.active = Some(approach);
                s.road_mut(approach).state = ApproachState::Green;
            });
            self.emit(JunctionEvent::road(
                EventKind::PhaseChange { phase: Phase::Green, remaining_s: green_s },
                approach,
                format!("GREEN signal for {} Road: {} seconds", approach, green_s),
            ))
            .await;
            self.hold(Duration::from_secs(green_s as u64), Some((approach, Phase::Green))).await?;

            self.update(|s| s.road_mut(approach).state = ApproachState::Yellow);
            self.emit(JunctionEvent::road(
                EventKind::PhaseChange { phase: Phase::Yellow, remaining_s: timing.yellow_s },
                approach,
                format!("YELLOW signal for {} Road: {} seconds", approach, timing.yellow_s),
            ))
            .await;
            self.hold(Duration::from_secs(timing.yellow_s as u64), Some((approach, Phase::Yellow))).await?;

            self.update(|s| {
                s.road_mut(approach).state = ApproachState::Red;
                s.active = None;
            });
            self.emit(JunctionEvent::road(
                EventKind::PhaseChange { phase: Phase::Red, remaining_s: 0 },
                approach,
                format!("RED signal for {} Road", approach),
            ))
            .await;
        }
        Ok(())
    }

    /// Waits out `total` in ticks, racing the stop token. Emits a countdown
    /// event whenever the remaining whole seconds drop.
    async fn hold(&self, total: Duration, countdown: Option<(Approach, Phase)>) -> Result<(), Stopped> {
        let tick = self.cfg.timing.tick();
        let deadline = Instant::now() + total;
        let mut shown = total.as_secs();

        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let left = deadline - now;
            let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
            if let Some((approach, phase)) = countdown {
                if secs < shown {
                    shown = secs;
                    self.emit_countdown(JunctionEvent::road(
                        EventKind::Countdown { phase, remaining_s: secs as u32 },
                        approach,
                        format!("{} {}s", phase, secs),
                    ));
                }
            }

            tokio::select! {
                _ = sleep(tick.min(left)) => {}
                _ = self.stop.cancelled() => return Err(Stopped),
            }
        }
    }

    fn check(&self) -> Result<(), Stopped> {
        if self.stop.is_cancelled() { Err(Stopped) } else { Ok(()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        relock(&*self.shared)
    }

    /// Applies `f` unless a reset has started a newer generation.
    fn update(&self, f: impl FnOnce(&mut JunctionState)) {
        let mut shared = self.lock();
        if shared.generation == self.generation {
            f(&mut shared.state);
        }
    }

    fn is_current(&self) -> bool {
        self.lock().generation == self.generation
    }

    async fn emit(&self, ev: JunctionEvent) {
        if !self.is_current() {
            debug!("junction: dropping event from a reset run: {}", ev);
            return;
        }
        debug!("event: {}", ev);
        if self.events.send(ev).await.is_err() {
            debug!("junction: no event subscriber");
        }
    }

    /// Countdowns never wait on the subscriber; the phase clock keeps running
    /// and ticks are dropped while the channel is close to full.
    fn emit_countdown(&self, ev: JunctionEvent) {
        if !self.is_current() {
            return;
        }
        if self.events.capacity() <= COUNTDOWN_HEADROOM {
            debug!("junction: subscriber lagging, dropped: {}", ev);
            return;
        }
        match self.events.try_send(ev) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => debug!("junction: subscriber lagging, dropped: {}", ev),
            Err(TrySendError::Closed(_)) => debug!("junction: no event subscriber"),
        }
    }
}
