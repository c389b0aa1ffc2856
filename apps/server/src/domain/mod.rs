//! Pure session-domain types: identifiers, the phase machine, the
//! orchestrator-owned session metadata, and the record shapes exchanged
//! with the external rule engine.

pub mod ids;
pub mod meta;
pub mod message;
pub mod phase;
pub mod records;
pub mod trace;

pub use ids::{ActionGroupId, ActionId, FactionId, PlayerId, Turn};
pub use message::{Message, MessageInfo};
pub use meta::{ActionMeta, FactionMeta, GameMeta, PlayerMeta, Schedule};
pub use phase::Phase;
pub use records::{
    Compulsion, DayResult, ExecutedAct, History, NightResult, PlanEntry, PlannedAct, PlayerRecord,
};
pub use trace::{ActTrace, TracePath};
