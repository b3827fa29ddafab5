use serde::Deserialize;

/// Linear green-time policy, clamped so cycle length stays practical whatever
/// the detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowPolicy {
    pub seconds_per_vehicle: u32,
    pub min_green_s: u32,
    pub max_green_s: u32,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self { seconds_per_vehicle: 2, min_green_s: 10, max_green_s: 60 }
    }
}

impl FlowPolicy {
    pub fn green_seconds(&self, max_concurrent: usize) -> u32 {
        let n = u32::try_from(max_concurrent).unwrap_or(u32::MAX);
        n.saturating_mul(self.seconds_per_vehicle)
            .clamp(self.min_green_s, self.max_green_s.max(self.min_green_s))
    }
}

/// Green time for the default policy: `clamp(2n, 10, 60)`.
pub fn estimate(max_concurrent: usize) -> u32 {
    FlowPolicy::default().green_seconds(max_concurrent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_samples() {
        assert_eq!(estimate(0), 10);
        assert_eq!(estimate(3), 10);
        assert_eq!(estimate(5), 10);
        assert_eq!(estimate(6), 12);
        assert_eq!(estimate(10), 20);
        assert_eq!(estimate(25), 50);
        assert_eq!(estimate(30), 60);
        assert_eq!(estimate(40), 60);
        assert_eq!(estimate(1000), 60);
        assert_eq!(estimate(usize::MAX), 60);
    }

    #[test]
    fn always_within_bounds() {
        for n in 0..500 {
            let g = estimate(n);
            assert!((10..=60).contains(&g));
            assert_eq!(g, ((n as u32) * 2).clamp(10, 60));
        }
    }

    #[test]
    fn custom_policy() {
        let p = FlowPolicy { seconds_per_vehicle: 3, min_green_s: 15, max_green_s: 45 };
        assert_eq!(p.green_seconds(0), 15);
        assert_eq!(p.green_seconds(10), 30);
        assert_eq!(p.green_seconds(20), 45);
    }
}
