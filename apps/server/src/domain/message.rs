use serde::{Deserialize, Serialize};

use super::ids::{ActionId, PlayerId};
use super::trace::ActTrace;

/// A unit of information delivered to exactly one player by phase
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub recipient: PlayerId,
    pub info: MessageInfo,
    /// When present, ties the message to one of the recipient's own
    /// executed acts (e.g. an investigation to the investigate act).
    #[serde(default)]
    pub act_trace: Option<ActTrace>,
}

/// Message payload variants. Closed sum type: every consumption site
/// matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageInfo {
    Investigation { result: bool },
    Reveal { player: PlayerId, role: String },
    Players { players: Vec<PlayerId> },
    Actions { actions: Vec<ActionId> },
    Greeting,
}
