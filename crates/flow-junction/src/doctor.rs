use anyhow::Result;
use tracing::warn;

use crate::{JunctionConfig, MAX_TICK_MS};

pub fn check_timing(cfg: &JunctionConfig) -> Result<()> {
    let t = &cfg.timing;
    anyhow::ensure!(t.yellow_s > 0, "timing.yellow_s must be > 0");
    anyhow::ensure!(
        t.tick_ms >= 10 && t.tick_ms <= MAX_TICK_MS,
        "timing.tick_ms should be 10..{}",
        MAX_TICK_MS
    );
    anyhow::ensure!(t.gap_s <= 30, "timing.gap_s too large");
    Ok(())
}

pub fn check_vision(cfg: &JunctionConfig) -> Result<()> {
    let v = &cfg.vision;
    anyhow::ensure!(!v.vocabulary.vehicle.is_empty(), "vision.vocabulary.vehicle is empty");
    anyhow::ensure!(
        (0.0..=1.0).contains(&v.vocabulary.min_confidence),
        "vision.vocabulary.min_confidence must be within 0..1"
    );
    let overlap = v.vocabulary.overlap();
    if !overlap.is_empty() {
        warn!("doctor: labels listed as both vehicle and emergency (treated as emergency): {:?}", overlap);
    }

    let f = &v.flow;
    anyhow::ensure!(f.min_green_s >= 1, "vision.flow.min_green_s must be >= 1");
    anyhow::ensure!(f.min_green_s <= f.max_green_s, "vision.flow.min_green_s > max_green_s");
    anyhow::ensure!(f.seconds_per_vehicle >= 1, "vision.flow.seconds_per_vehicle must be >= 1");
    anyhow::ensure!(v.tracker.max_disappeared >= 1, "vision.tracker.max_disappeared must be >= 1");
    Ok(())
}

pub fn check_config(cfg: &JunctionConfig) -> Result<()> {
    check_timing(cfg)?;
    check_vision(cfg)?;
    Ok(())
}
