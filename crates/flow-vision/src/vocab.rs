use serde::Deserialize;

use crate::Detection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelClass {
    Vehicle,
    Emergency,
    Ignored,
}

/// Outcome of filtering one detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Tracked(LabelClass),
    LowConfidence,
    Ignored,
}

/// Recognized detector labels, fixed at startup.
///
/// Labels must match the detector's strings exactly. Anything not listed is
/// classified as [`LabelClass::Ignored`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub vehicle: Vec<String>,
    pub emergency: Vec<String>,
    pub min_confidence: f32,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            vehicle: ["car", "bus", "truck", "motorcycle"].iter().map(|s| s.to_string()).collect(),
            emergency: ["ambulance", "fire engine"].iter().map(|s| s.to_string()).collect(),
            min_confidence: 0.5,
        }
    }
}

impl Vocabulary {
    pub fn classify(&self, label: &str) -> LabelClass {
        if self.emergency.iter().any(|l| l == label) {
            LabelClass::Emergency
        } else if self.vehicle.iter().any(|l| l == label) {
            LabelClass::Vehicle
        } else {
            LabelClass::Ignored
        }
    }

    pub fn admit(&self, det: &Detection) -> Admission {
        match self.classify(&det.label) {
            LabelClass::Ignored => Admission::Ignored,
            // strictly above the threshold
            class if det.conf > self.min_confidence => Admission::Tracked(class),
            _ => Admission::LowConfidence,
        }
    }

    /// Labels present in both lists (they count as emergency).
    pub fn overlap(&self) -> Vec<&str> {
        self.vehicle
            .iter()
            .filter(|v| self.emergency.contains(v))
            .map(|s| s.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary() {
        let v = Vocabulary::default();
        assert_eq!(v.classify("car"), LabelClass::Vehicle);
        assert_eq!(v.classify("motorcycle"), LabelClass::Vehicle);
        assert_eq!(v.classify("fire engine"), LabelClass::Emergency);
        assert_eq!(v.classify("person"), LabelClass::Ignored);
        // exact match only
        assert_eq!(v.classify("Car"), LabelClass::Ignored);
    }

    #[test]
    fn admission_uses_strict_threshold() {
        let v = Vocabulary::default();
        let at = Detection::new(0.0, 0.0, 1.0, 1.0, "bus", 0.5);
        let above = Detection::new(0.0, 0.0, 1.0, 1.0, "bus", 0.51);
        let amb = Detection::new(0.0, 0.0, 1.0, 1.0, "ambulance", 0.9);
        let dog = Detection::new(0.0, 0.0, 1.0, 1.0, "dog", 0.99);
        assert_eq!(v.admit(&at), Admission::LowConfidence);
        assert_eq!(v.admit(&above), Admission::Tracked(LabelClass::Vehicle));
        assert_eq!(v.admit(&amb), Admission::Tracked(LabelClass::Emergency));
        assert_eq!(v.admit(&dog), Admission::Ignored);
    }

    #[test]
    fn emergency_wins_on_overlap() {
        let v = Vocabulary {
            vehicle: vec!["truck".into(), "ambulance".into()],
            emergency: vec!["ambulance".into()],
            min_confidence: 0.5,
        };
        assert_eq!(v.classify("ambulance"), LabelClass::Emergency);
        assert_eq!(v.overlap(), vec!["ambulance"]);
    }
}
