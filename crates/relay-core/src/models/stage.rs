use serde::{Deserialize, Serialize};

/// One unit in the fixed pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    DataCollection,
    Content,
    Design,
    Quality,
    Delivery,
}

impl Stage {
    /// Pipeline order. Every handoff moves exactly one step along it.
    pub const ALL: [Stage; 5] = [
        Stage::DataCollection,
        Stage::Content,
        Stage::Design,
        Stage::Quality,
        Stage::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataCollection => "data-collection",
            Self::Content => "content",
            Self::Design => "design",
            Self::Quality => "quality",
            Self::Delivery => "delivery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "data-collection" => Some(Self::DataCollection),
            "content" => Some(Self::Content),
            "design" => Some(Self::Design),
            "quality" => Some(Self::Quality),
            "delivery" => Some(Self::Delivery),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::DataCollection => 0,
            Self::Content => 1,
            Self::Design => 2,
            Self::Quality => 3,
            Self::Delivery => 4,
        }
    }

    pub fn total() -> usize {
        Self::ALL.len()
    }

    pub fn first() -> Self {
        Self::DataCollection
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn is_adjacent(from: Stage, to: Stage) -> bool {
        from.next() == Some(to)
    }

    /// Stages from `self` (inclusive) to the end of the pipeline.
    pub fn remaining(&self) -> &'static [Stage] {
        &Self::ALL[self.index()..]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of the pipeline finished once `completed` stages are done.
pub fn completion_percentage(completed: usize) -> f64 {
    (completed.min(Stage::total()) as f64 / Stage::total() as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_adjacency() {
        assert_eq!(Stage::first(), Stage::DataCollection);
        assert_eq!(Stage::DataCollection.next(), Some(Stage::Content));
        assert_eq!(Stage::Delivery.next(), None);
        assert_eq!(Stage::DataCollection.previous(), None);
        assert_eq!(Stage::Quality.previous(), Some(Stage::Design));

        assert!(Stage::is_adjacent(Stage::Content, Stage::Design));
        assert!(!Stage::is_adjacent(Stage::Content, Stage::Quality));
        assert!(!Stage::is_adjacent(Stage::Design, Stage::Content));
    }

    #[test]
    fn test_stage_names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_str(stage.as_str()), Some(stage));
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
        assert_eq!(Stage::from_str("publishing"), None);
    }

    #[test]
    fn test_completion_percentage() {
        assert_eq!(completion_percentage(0), 0.0);
        assert_eq!(completion_percentage(2), 40.0);
        assert_eq!(completion_percentage(5), 100.0);
        assert_eq!(completion_percentage(9), 100.0);
    }

    #[test]
    fn test_remaining() {
        assert_eq!(
            Stage::Design.remaining(),
            &[Stage::Design, Stage::Quality, Stage::Delivery]
        );
    }
}
