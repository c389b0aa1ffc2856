//! Record shapes returned by the rule engine's view calls, plus the
//! per-phase result records the orchestrator composes and archives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{ActionGroupId, ActionId, PlayerId, Turn};
use super::message::Message;
use super::phase::Phase;
use super::trace::ActTrace;

/// One slot of the night plan as the engine sees it: the grant, the
/// submitted act (if any), and what the holder could legally do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub action_group: ActionGroupId,
    pub action: ActionId,
    pub source: PlayerId,
    #[serde(default)]
    pub act: Option<PlannedAct>,
    /// Legal target sets, one candidate list per target slot.
    pub candidates: Vec<Vec<PlayerId>>,
    pub available: bool,
    pub compulsion: Compulsion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAct {
    pub targets: Vec<PlayerId>,
    pub trace: ActTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compulsion {
    Voluntary,
    Forced,
}

/// An action that actually executed during phase resolution, in
/// engine-assigned order within `view-history` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedAct {
    pub action: ActionId,
    pub source: PlayerId,
    pub targets: Vec<PlayerId>,
    pub trace: ActTrace,
}

/// Engine-owned mutable state of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub faction: super::ids::FactionId,
    /// Cause of death, None while alive.
    #[serde(default)]
    pub death: Option<String>,
    #[serde(default)]
    pub friends: Vec<PlayerId>,
    #[serde(default)]
    pub cohorts: Vec<PlayerId>,
    #[serde(default)]
    pub vanillaized: bool,
}

impl PlayerRecord {
    pub fn is_dead(&self) -> bool {
        self.death.is_some()
    }
}

/// Executed acts per turn and phase, as reported by `view-history`.
pub type History = BTreeMap<Turn, BTreeMap<Phase, Vec<ExecutedAct>>>;

/// Archived outcome of one night, composed from the engine's view
/// calls right after resolution and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightResult {
    pub used_plan: Vec<PlanEntry>,
    pub messages: Vec<Message>,
    pub deaths: BTreeMap<PlayerId, String>,
}

/// Archived outcome of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayResult {
    pub used_ballot: BTreeMap<PlayerId, Option<PlayerId>>,
    pub deaths: BTreeMap<PlayerId, String>,
}
