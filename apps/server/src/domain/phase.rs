use serde::{Deserialize, Serialize};

/// Session phase machine. `Night -> Day -> Night -> ...` driven by the
/// scheduler; `End` is terminal and reached whenever the engine reports
/// winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Night,
    Day,
    End,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::End)
    }

    /// The phase that resolution of `self` leads into. Terminal stays
    /// terminal.
    pub fn next(self) -> Phase {
        match self {
            Phase::Night => Phase::Day,
            Phase::Day => Phase::Night,
            Phase::End => Phase::End,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Night => "Night",
            Phase::Day => "Day",
            Phase::End => "End",
        }
    }
}
