use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four roads meeting at the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    North,
    East,
    South,
    West,
}

impl Approach {
    /// Fixed visiting order. Never reordered by load.
    pub const ALL: [Approach; 4] = [Approach::North, Approach::East, Approach::South, Approach::West];

    pub fn index(self) -> usize {
        match self {
            Approach::North => 0,
            Approach::East => 1,
            Approach::South => 2,
            Approach::West => 3,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Approach::North => "North",
            Approach::East => "East",
            Approach::South => "South",
            Approach::West => "West",
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Approach {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Approach::North),
            "east" | "e" => Ok(Approach::East),
            "south" | "s" => Ok(Approach::South),
            "west" | "w" => Ok(Approach::West),
            other => Err(format!("unknown approach: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Green => "GREEN",
            Phase::Yellow => "YELLOW",
            Phase::Red => "RED",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visiting_order_is_fixed() {
        let idx: Vec<usize> = Approach::ALL.iter().map(|a| a.index()).collect();
        assert_eq!(idx, vec![0, 1, 2, 3]);
        assert_eq!(Approach::from_index(2), Some(Approach::South));
        assert_eq!(Approach::from_index(4), None);
    }

    #[test]
    fn parses_short_and_long_names() {
        assert_eq!("north".parse::<Approach>().unwrap(), Approach::North);
        assert_eq!("W".parse::<Approach>().unwrap(), Approach::West);
        assert!("up".parse::<Approach>().is_err());
    }
}
