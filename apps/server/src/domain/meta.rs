//! Orchestrator-owned session metadata, persisted as `meta.json` in the
//! game directory. Everything here is display/bookkeeping data; the
//! authoritative game state lives in the engine-owned snapshot and is
//! opaque to the server apart from its turn counter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{ActionId, FactionId, PlayerId};
use super::phase::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMeta {
    pub name: String,
    #[serde(default)]
    pub motd: Option<String>,
    /// Urlsafe-base64 token-signing secret, generated at build time.
    pub secret: String,
    pub phase: Phase,
    pub schedule: Schedule,
    pub players: BTreeMap<PlayerId, PlayerMeta>,
    pub factions: BTreeMap<FactionId, FactionMeta>,
    pub actions: BTreeMap<ActionId, ActionMeta>,
}

impl GameMeta {
    /// Display-name → id map, used to resolve client-supplied target
    /// names.
    pub fn player_id_by_name(&self, name: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(id, _)| *id)
    }

    pub fn player_name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }
}

/// Immutable player identity plus the one orchestrator-owned mutable
/// field: the will. Everything else about a player (faction, death,
/// friends) is engine-owned and read back through `view-players`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerMeta {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub abilities: Vec<String>,
    /// Free-text note shown to everyone once the player dies. Edits are
    /// rejected after death.
    #[serde(default)]
    pub will: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionMeta {
    pub name: String,
    pub agenda: String,
    /// Role-name overrides for in-faction display. The `"vanilla"` key
    /// is the label shown for a vanillaized member.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub is_primary: bool,
    /// Whether members of this faction learn each other's identities
    /// (cohorts shown in the identity view).
    #[serde(default)]
    pub members_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMeta {
    /// Command template with positional `$0..$n` target slots, e.g.
    /// `"kill $0"`.
    pub command: String,
    pub description: String,
    /// Hidden actions are kept out of aggregate action listings.
    #[serde(default)]
    pub ninja: bool,
}

/// Wall-clock phase schedule. Times are `HH:MM:SS` strings in the
/// session's fixed UTC offset; `phase_end` is the absolute Unix
/// timestamp of the next deadline (None before the session starts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub night_end: String,
    pub day_end: String,
    #[serde(default)]
    pub twilight_secs: u64,
    #[serde(default = "default_offset")]
    pub utc_offset: String,
    #[serde(default)]
    pub phase_end: Option<i64>,
}

fn default_true() -> bool {
    true
}

fn default_offset() -> String {
    "+00:00".to_string()
}
