use serde::Deserialize;
use std::collections::BTreeMap;

use crate::{BoundingBox, Centroid};

pub type ObjectId = u64;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive unmatched frames an object survives before it is dropped.
    pub max_disappeared: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        // ~1s at common frame rates
        Self { max_disappeared: 30 }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: ObjectId,
    pub centroid: Centroid,
    pub misses: u32, // consecutive frames without a match
}

/// Centroid tracker: keeps object identities stable across frames of one video.
///
/// Ids are handed out from a monotonically increasing counter and never reused
/// while the tracker lives.
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    cfg: TrackerConfig,
    next_id: ObjectId,
    // registration order == ascending id
    objects: Vec<TrackedObject>,
}

impl CentroidTracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self { cfg, next_id: 0, objects: vec![] }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn next_id(&self) -> ObjectId {
        self.next_id
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn update(&mut self, boxes: &[BoundingBox]) -> BTreeMap<ObjectId, Centroid> {
        let inputs: Vec<Centroid> = boxes.iter().map(|b| b.centroid()).collect();

        if self.objects.is_empty() {
            for c in inputs {
                self.register(c);
            }
            return self.mapping();
        }

        // Greedy global association: smallest distance first.
        // Ties: earliest-registered object, then detection order.
        let mut pairs = Vec::with_capacity(self.objects.len() * inputs.len());
        for (oi, o) in self.objects.iter().enumerate() {
            for (di, c) in inputs.iter().enumerate() {
                pairs.push((o.centroid.distance(c), oi, di));
            }
        }
        pairs.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut used_obj = vec![false; self.objects.len()];
        let mut used_det = vec![false; inputs.len()];
        let mut remaining = self.objects.len().min(inputs.len());
        for (_, oi, di) in pairs {
            if remaining == 0 { break; }
            if used_obj[oi] || used_det[di] { continue; }
            let o = &mut self.objects[oi];
            o.centroid = inputs[di];
            o.misses = 0;
            used_obj[oi] = true;
            used_det[di] = true;
            remaining -= 1;
        }

        for (oi, o) in self.objects.iter_mut().enumerate() {
            if !used_obj[oi] {
                o.misses += 1;
            }
        }
        let max_disappeared = self.cfg.max_disappeared;
        self.objects.retain(|o| o.misses <= max_disappeared);

        for (di, c) in inputs.into_iter().enumerate() {
            if !used_det[di] {
                self.register(c);
            }
        }

        self.mapping()
    }

    fn register(&mut self, centroid: Centroid) {
        self.objects.push(TrackedObject { id: self.next_id, centroid, misses: 0 });
        self.next_id += 1;
    }

    fn mapping(&self) -> BTreeMap<ObjectId, Centroid> {
        self.objects.iter().map(|o| (o.id, o.centroid)).collect()
    }
}
