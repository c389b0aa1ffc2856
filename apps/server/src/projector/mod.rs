//! Player-scoped view projection.
//!
//! Every function here is pure: raw engine output plus session
//! metadata in, display-ready structures out. Given identical inputs
//! the output is byte-identical (fields in fixed declaration order,
//! maps are `BTreeMap`s) — the connection hub's diffing depends on
//! this, so nothing in this module may consult clocks, randomness, or
//! iteration order of unordered containers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{
    Compulsion, DayResult, GameMeta, Message, MessageInfo, NightResult, PlanEntry, PlayerId,
    PlayerRecord, Turn,
};

/// Metadata plus the engine's current player records; everything a
/// projection needs.
#[derive(Clone, Copy)]
pub struct ProjectionCtx<'a> {
    pub meta: &'a GameMeta,
    pub players: &'a BTreeMap<PlayerId, PlayerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicView {
    pub name: String,
    pub motd: Option<String>,
    pub turn: Turn,
    pub phase_end: Option<i64>,
    /// Dead players' true roles; None while a player lives.
    pub flips: BTreeMap<String, Option<String>>,
    /// Dead players' wills, public from the moment of death.
    pub wills: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityView {
    pub name: String,
    pub role: String,
    pub faction: String,
    pub agenda: String,
    pub friends: Vec<String>,
    /// Fellow faction members, shown only when the faction reveals its
    /// membership.
    pub cohorts: Vec<String>,
    pub death: Option<String>,
    pub will: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanActionView {
    pub command: String,
    pub description: String,
    pub targets: Option<Vec<String>>,
    pub candidates: Vec<Vec<String>>,
    pub available: bool,
    pub compulsion: Compulsion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallotView {
    pub votes: BTreeMap<String, Option<String>>,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase")]
pub enum PhaseView {
    Night { plan: Vec<PlanActionView> },
    Day { ballot: BallotView },
    End { winners: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    /// Index into the viewer's own used-plan list when the message is
    /// tied to one of their acts.
    pub i: Option<usize>,
    pub info: MessageInfoView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MessageInfoView {
    Investigation { result: bool },
    Reveal { player: String, role: String },
    Players { players: Vec<String> },
    Actions { commands: Vec<String> },
    Greeting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightResultView {
    pub deaths: BTreeMap<String, String>,
    pub used_plan: Vec<PlanActionView>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayResultView {
    pub votes: BTreeMap<String, Option<String>>,
    pub deaths: BTreeMap<String, String>,
}

/// The viewer's display role: vanillaized players collapse to their
/// faction's vanilla label, otherwise the faction's translation of the
/// true role (falling back to the role itself).
pub fn display_role(ctx: ProjectionCtx<'_>, id: PlayerId) -> String {
    let role = ctx
        .meta
        .players
        .get(&id)
        .map(|p| p.role.clone())
        .unwrap_or_else(|| format!("#{id}"));

    let Some(record) = ctx.players.get(&id) else {
        return role;
    };
    let Some(faction) = ctx.meta.factions.get(&record.faction) else {
        return role;
    };

    if record.vanillaized {
        faction
            .translations
            .get("vanilla")
            .cloned()
            .unwrap_or_else(|| "Vanilla".to_string())
    } else {
        faction.translations.get(&role).cloned().unwrap_or(role)
    }
}

pub fn public_view(ctx: ProjectionCtx<'_>, turn: Turn) -> PublicView {
    let flips = ctx
        .players
        .iter()
        .map(|(id, record)| {
            let role = ctx.meta.players.get(id).map(|p| p.role.clone());
            (
                ctx.meta.player_name(*id),
                if record.is_dead() { role } else { None },
            )
        })
        .collect();

    let wills = ctx
        .players
        .iter()
        .filter(|(_, record)| record.is_dead())
        .map(|(id, _)| {
            let will = ctx
                .meta
                .players
                .get(id)
                .map(|p| p.will.clone())
                .unwrap_or_default();
            (ctx.meta.player_name(*id), will)
        })
        .collect();

    PublicView {
        name: ctx.meta.name.clone(),
        motd: ctx.meta.motd.clone(),
        turn,
        phase_end: ctx.meta.schedule.phase_end,
        flips,
        wills,
    }
}

pub fn identity_view(ctx: ProjectionCtx<'_>, viewer: PlayerId) -> IdentityView {
    let name = ctx.meta.player_name(viewer);
    let will = ctx
        .meta
        .players
        .get(&viewer)
        .map(|p| p.will.clone())
        .unwrap_or_default();

    let Some(record) = ctx.players.get(&viewer) else {
        return IdentityView {
            name,
            role: String::new(),
            faction: String::new(),
            agenda: String::new(),
            friends: Vec::new(),
            cohorts: Vec::new(),
            death: None,
            will,
        };
    };

    let faction = ctx.meta.factions.get(&record.faction);
    let cohorts = match faction {
        Some(f) if f.members_visible => record
            .cohorts
            .iter()
            .map(|id| ctx.meta.player_name(*id))
            .collect(),
        _ => Vec::new(),
    };

    IdentityView {
        name,
        role: display_role(ctx, viewer),
        faction: faction.map(|f| f.name.clone()).unwrap_or_default(),
        agenda: faction.map(|f| f.agenda.clone()).unwrap_or_default(),
        friends: record
            .friends
            .iter()
            .map(|id| ctx.meta.player_name(*id))
            .collect(),
        cohorts,
        death: record.death.clone(),
        will,
    }
}

/// Plan entries relevant to one viewer: exactly those they are the
/// source of. The index positions in the returned list are the ones
/// clients reference in `plan`/`impulse` commands.
pub fn filter_plan<'e>(entries: &'e [PlanEntry], viewer: PlayerId) -> Vec<&'e PlanEntry> {
    entries.iter().filter(|e| e.source == viewer).collect()
}

pub fn plan_view(meta: &GameMeta, entries: &[&PlanEntry]) -> Vec<PlanActionView> {
    entries
        .iter()
        .map(|entry| {
            let (command, description) = match meta.actions.get(&entry.action) {
                Some(action) => (action.command.clone(), action.description.clone()),
                None => (format!("#{}", entry.action), String::new()),
            };
            PlanActionView {
                command,
                description,
                targets: entry.act.as_ref().map(|act| {
                    act.targets.iter().map(|id| meta.player_name(*id)).collect()
                }),
                candidates: entry
                    .candidates
                    .iter()
                    .map(|slot| slot.iter().map(|id| meta.player_name(*id)).collect())
                    .collect(),
                available: entry.available,
                compulsion: entry.compulsion,
            }
        })
        .collect()
}

/// Day ballot as everyone sees it: one vote slot per living player,
/// None for a retracted or never-cast vote.
pub fn ballot_view(
    ctx: ProjectionCtx<'_>,
    ballot: &BTreeMap<PlayerId, Option<PlayerId>>,
) -> BallotView {
    let living: Vec<PlayerId> = ctx
        .players
        .iter()
        .filter(|(_, record)| !record.is_dead())
        .map(|(id, _)| *id)
        .collect();

    BallotView {
        votes: living
            .iter()
            .map(|id| {
                let target = ballot
                    .get(id)
                    .and_then(|t| t.as_ref())
                    .map(|t| ctx.meta.player_name(*t));
                (ctx.meta.player_name(*id), target)
            })
            .collect(),
        candidates: living.iter().map(|id| ctx.meta.player_name(*id)).collect(),
    }
}

pub fn winners_view(meta: &GameMeta, winners: &[PlayerId]) -> Vec<String> {
    winners.iter().map(|id| meta.player_name(*id)).collect()
}

fn message_view(
    meta: &GameMeta,
    viewer_plan: &[&PlanEntry],
    message: &Message,
) -> MessageView {
    let i = message.act_trace.as_ref().and_then(|trace| {
        viewer_plan.iter().position(|entry| {
            entry
                .act
                .as_ref()
                .map(|act| &act.trace == trace)
                .unwrap_or(false)
        })
    });

    let info = match &message.info {
        MessageInfo::Investigation { result } => MessageInfoView::Investigation { result: *result },
        MessageInfo::Reveal { player, role } => MessageInfoView::Reveal {
            player: meta.player_name(*player),
            role: role.clone(),
        },
        MessageInfo::Players { players } => MessageInfoView::Players {
            players: players.iter().map(|id| meta.player_name(*id)).collect(),
        },
        MessageInfo::Actions { actions } => {
            // Dedup repeated grants of one action by display command;
            // ninja actions stay hidden from aggregate listings.
            let mut commands: Vec<String> = Vec::new();
            for action_id in actions {
                let Some(action) = meta.actions.get(action_id) else {
                    continue;
                };
                if action.ninja {
                    continue;
                }
                if !commands.contains(&action.command) {
                    commands.push(action.command.clone());
                }
            }
            MessageInfoView::Actions { commands }
        }
        MessageInfo::Greeting => MessageInfoView::Greeting,
    };

    MessageView { i, info }
}

pub fn night_result_view(
    meta: &GameMeta,
    result: &NightResult,
    viewer: PlayerId,
) -> NightResultView {
    let viewer_plan = filter_plan(&result.used_plan, viewer);

    NightResultView {
        deaths: result
            .deaths
            .iter()
            .map(|(id, cause)| (meta.player_name(*id), cause.clone()))
            .collect(),
        used_plan: plan_view(meta, &viewer_plan),
        messages: result
            .messages
            .iter()
            .filter(|m| m.recipient == viewer)
            .map(|m| message_view(meta, &viewer_plan, m))
            .collect(),
    }
}

pub fn day_result_view(meta: &GameMeta, result: &DayResult) -> DayResultView {
    DayResultView {
        votes: result
            .used_ballot
            .iter()
            .map(|(source, target)| {
                (
                    meta.player_name(*source),
                    target.map(|t| meta.player_name(t)),
                )
            })
            .collect(),
        deaths: result
            .deaths
            .iter()
            .map(|(id, cause)| (meta.player_name(*id), cause.clone()))
            .collect(),
    }
}

/// Substitute `$0..$n` slots in a command template with target names.
pub fn render_command(template: &str, targets: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            digits.push(*d);
            chars.next();
        }
        match digits.parse::<usize>().ok().and_then(|i| targets.get(i)) {
            Some(name) => out.push_str(name),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

/// Human-readable dump of the submitted plan for the admin peek
/// surface: one `Name: rendered command` line per submitted act.
pub fn peek_lines(meta: &GameMeta, entries: &[PlanEntry]) -> String {
    entries
        .iter()
        .filter_map(|entry| {
            let act = entry.act.as_ref()?;
            let template = meta
                .actions
                .get(&entry.action)
                .map(|a| a.command.as_str())
                .unwrap_or("?");
            let targets: Vec<String> =
                act.targets.iter().map(|id| meta.player_name(*id)).collect();
            Some(format!(
                "{}: {}",
                meta.player_name(entry.source),
                render_command(template, &targets)
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests;
