//! Wire types for the realtime client protocol.
//!
//! Client commands carry a client-assigned `seq_num` and receive
//! exactly one `ack` or `rej` in response. Server pushes (`root`,
//! `pend`, `refresh`) are independent of command acknowledgements:
//! `root` carries the full view on connect and partial views after,
//! `pend` announces a closed phase with its results, `refresh` tells
//! the client to reload from scratch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Phase, Turn};
use crate::projector::{DayResultView, IdentityView, NightResultView, PhaseView, PublicView};

#[derive(Debug, Clone, Deserialize)]
pub struct ClientCommand {
    pub seq_num: u64,
    #[serde(flatten)]
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    /// Submit or retract (targets: null) a night-plan action. The
    /// index addresses the player's own plan listing.
    Plan {
        action_index: usize,
        targets: Option<Vec<String>>,
    },
    /// Cast or retract (target: null) a day vote.
    Vote { target: Option<String> },
    /// Execute a day-phase action immediately.
    Impulse {
        action_index: usize,
        targets: Vec<String>,
    },
    /// Replace the player's will text.
    Will { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    Ack {
        seq_num: u64,
    },
    Rej {
        seq_num: u64,
        reason: String,
    },
    Root {
        #[serde(flatten)]
        body: RootBody,
    },
    Pend {
        #[serde(flatten)]
        body: PendBody,
    },
    Refresh,
}

/// A `root` push. On connect every field is populated; subsequent
/// pushes carry only the sections that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RootBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<PublicView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseView>,
    /// Projected outcomes of already-resolved phases, keyed by turn.
    /// Populated on connect only; incremental pushes leave these unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub night_results: Option<BTreeMap<Turn, NightResultView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_results: Option<BTreeMap<Turn, DayResultView>>,
}

impl RootBody {
    pub fn is_empty(&self) -> bool {
        self.public.is_none()
            && self.identity.is_none()
            && self.phase.is_none()
            && self.night_results.is_none()
            && self.day_results.is_none()
    }
}

/// A `pend` push: the just-closed phase's outcome plus the full root
/// of the phase now opening.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendBody {
    pub turn: Turn,
    pub closed: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub night_result: Option<NightResultView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_result: Option<DayResultView>,
    #[serde(flatten)]
    pub root: RootBody,
}
