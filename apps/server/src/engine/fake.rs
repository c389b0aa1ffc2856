//! In-process stand-in for the engine binaries, used by session and
//! scheduler tests. Implements just enough rules to exercise the
//! orchestrator: plan slots, kills, plurality lynches, consensus
//! detection, and data-driven win rules. State files use the same
//! opaque-JSON contract as the real engine (the orchestrator only ever
//! reads `turn` out of them).

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{EngineError, EngineOp, RuleEngine};
use crate::domain::{
    ActTrace, ActionGroupId, ActionId, Compulsion, ExecutedAct, History, Message, Phase, PlanEntry,
    PlannedAct, PlayerId, PlayerRecord, Turn,
};
use crate::engine::client::{KillOrder, PlanSubmission, VoteSubmission};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub action_group: ActionGroupId,
    pub action: ActionId,
    pub source: PlayerId,
    pub candidates: Vec<Vec<PlayerId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinRule {
    pub dead: PlayerId,
    pub winners: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeState {
    pub turn: Turn,
    pub players: BTreeMap<PlayerId, PlayerRecord>,
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub kill_actions: Vec<ActionId>,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub winners: Option<Vec<PlayerId>>,
    #[serde(default)]
    pub win_rules: Vec<WinRule>,
    #[serde(default)]
    pub messages_out: Vec<Message>,
}

impl FakeState {
    fn apply_win_rules(&mut self) {
        if self.winners.is_some() {
            return;
        }
        for rule in &self.win_rules {
            let dead = self
                .players
                .get(&rule.dead)
                .map(|p| p.is_dead())
                .unwrap_or(false);
            if dead {
                self.winners = Some(rule.winners.clone());
                return;
            }
        }
    }

    fn living(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|(_, p)| !p.is_dead())
            .map(|(id, _)| *id)
            .collect()
    }
}

type FakePlan = BTreeMap<ActionGroupId, Vec<PlayerId>>;
type FakeBallot = BTreeMap<PlayerId, PlayerId>;

/// The fake itself. `fail_ops` injects engine failures by op name so
/// tests can assert the not-applied/halt behavior.
#[derive(Default)]
pub struct FakeEngine {
    fail_ops: Mutex<HashSet<&'static str>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, op: EngineOp) {
        self.fail_ops.lock().insert(op.program());
    }

    fn check_failure(&self, op: EngineOp) -> Result<(), EngineError> {
        if self.fail_ops.lock().remove(op.program()) {
            return Err(EngineError::Failed {
                op: op.program(),
                status: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn read<T: serde::de::DeserializeOwned>(op: EngineOp, path: &Path) -> Result<T, EngineError> {
    let bytes = fs::read(path).map_err(|source| EngineError::Spawn {
        op: op.program(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| EngineError::Decode {
        op: op.program(),
        source,
    })
}

fn write<T: Serialize>(op: EngineOp, path: &Path, value: &T) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| EngineError::Decode {
        op: op.program(),
        source,
    })?;
    fs::write(path, bytes).map_err(|source| EngineError::Spawn {
        op: op.program(),
        source,
    })
}

fn to_value<T: Serialize>(op: EngineOp, value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|source| EngineError::Decode {
        op: op.program(),
        source,
    })
}

fn decode_input<T: serde::de::DeserializeOwned>(
    op: EngineOp,
    input: Option<serde_json::Value>,
) -> Result<T, EngineError> {
    let value = input.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|source| EngineError::Decode {
        op: op.program(),
        source,
    })
}

fn plan_entries(state: &FakeState, plan: &FakePlan) -> Vec<PlanEntry> {
    state
        .grants
        .iter()
        .map(|grant| PlanEntry {
            action_group: grant.action_group,
            action: grant.action,
            source: grant.source,
            act: plan.get(&grant.action_group).map(|targets| PlannedAct {
                targets: targets.clone(),
                trace: ActTrace::FromPlan {
                    action_group: grant.action_group,
                },
            }),
            candidates: grant.candidates.clone(),
            available: state
                .players
                .get(&grant.source)
                .map(|p| !p.is_dead())
                .unwrap_or(false),
            compulsion: Compulsion::Voluntary,
        })
        .collect()
}

fn kill(state: &mut FakeState, target: PlayerId, cause: &str) {
    if let Some(record) = state.players.get_mut(&target) {
        if record.death.is_none() {
            record.death = Some(cause.to_string());
        }
    }
}

fn record_act(state: &mut FakeState, turn: Turn, phase: Phase, act: ExecutedAct) {
    state
        .history
        .entry(turn)
        .or_default()
        .entry(phase)
        .or_default()
        .push(act);
}

#[async_trait]
impl RuleEngine for FakeEngine {
    async fn call(
        &self,
        op: EngineOp,
        args: &[&Path],
        input: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        self.check_failure(op)?;

        match op {
            EngineOp::ViewPlan => {
                let state: FakeState = read(op, args[0])?;
                let plan: FakePlan = read(op, args[1])?;
                to_value(op, &plan_entries(&state, &plan))
            }

            EngineOp::ViewBallot => {
                let ballot: FakeBallot = read(op, args[0])?;
                let view: BTreeMap<PlayerId, Option<PlayerId>> =
                    ballot.into_iter().map(|(s, t)| (s, Some(t))).collect();
                to_value(op, &view)
            }

            EngineOp::ViewHistory => {
                let state: FakeState = read(op, args[0])?;
                to_value(op, &state.history)
            }

            EngineOp::ViewMessages => {
                let post: FakeState = read(op, args[1])?;
                to_value(op, &post.messages_out)
            }

            EngineOp::ViewDeaths => {
                let pre: FakeState = read(op, args[0])?;
                let post: FakeState = read(op, args[1])?;
                let deaths: BTreeMap<PlayerId, String> = post
                    .players
                    .iter()
                    .filter_map(|(id, p)| {
                        let was_alive = pre.players.get(id).map(|q| !q.is_dead()).unwrap_or(true);
                        match (&p.death, was_alive) {
                            (Some(cause), true) => Some((*id, cause.clone())),
                            _ => None,
                        }
                    })
                    .collect();
                to_value(op, &deaths)
            }

            EngineOp::ViewPlayers => {
                let state: FakeState = read(op, args[0])?;
                to_value(op, &state.players)
            }

            EngineOp::ViewWinners => {
                let state: FakeState = read(op, args[0])?;
                to_value(op, &state.winners)
            }

            EngineOp::SubmitPlan => {
                let state: FakeState = read(op, args[0])?;
                let mut plan: FakePlan = read(op, args[1])?;
                let submission: PlanSubmission = decode_input(op, input)?;

                let known = state
                    .grants
                    .iter()
                    .any(|g| g.action_group == submission.action_group);
                if !known {
                    return Err(EngineError::Failed {
                        op: op.program(),
                        status: 1,
                        stderr: "unknown action group".to_string(),
                    });
                }

                match submission.targets {
                    Some(targets) => plan.insert(submission.action_group, targets),
                    None => plan.remove(&submission.action_group),
                };
                write(op, args[1], &plan)?;
                Ok(serde_json::Value::Null)
            }

            EngineOp::SubmitVote => {
                let state: FakeState = read(op, args[0])?;
                let mut ballot: FakeBallot = read(op, args[1])?;
                let submission: VoteSubmission = decode_input(op, input)?;

                match submission.target {
                    Some(target) => ballot.insert(submission.source, target),
                    None => ballot.remove(&submission.source),
                };
                write(op, args[1], &ballot)?;

                let living = state.living();
                let consensus = living.iter().any(|candidate| {
                    let votes = ballot.values().filter(|t| *t == candidate).count();
                    votes * 2 > living.len()
                });
                to_value(op, &serde_json::json!({ "consensus": consensus }))
            }

            EngineOp::Impulse => {
                let mut state: FakeState = read(op, args[0])?;
                let submission: PlanSubmission = decode_input(op, input)?;

                let targets = submission.targets.unwrap_or_default();
                if state.kill_actions.contains(&submission.action) {
                    for target in &targets {
                        kill(&mut state, *target, "killed by impulse");
                    }
                }
                let turn = state.turn;
                record_act(
                    &mut state,
                    turn,
                    Phase::Day,
                    ExecutedAct {
                        action: submission.action,
                        source: submission.source,
                        targets,
                        trace: ActTrace::FromPlan {
                            action_group: submission.action_group,
                        },
                    },
                );
                state.apply_win_rules();
                write(op, args[1], &state)
                    .map(|_| serde_json::Value::Null)
            }

            EngineOp::ResolveNight => {
                let mut state: FakeState = read(op, args[0])?;
                let plan: FakePlan = read(op, args[1])?;

                state.messages_out.clear();
                let turn = state.turn;
                for entry in plan_entries(&state.clone(), &plan) {
                    let Some(act) = entry.act else { continue };
                    if state.kill_actions.contains(&entry.action) {
                        for target in &act.targets {
                            kill(&mut state, *target, "killed in the night");
                        }
                    }
                    record_act(
                        &mut state,
                        turn,
                        Phase::Night,
                        ExecutedAct {
                            action: entry.action,
                            source: entry.source,
                            targets: act.targets,
                            trace: act.trace,
                        },
                    );
                }
                state.apply_win_rules();
                write(op, args[2], &state)?;
                Ok(serde_json::Value::Null)
            }

            EngineOp::ResolveDay => {
                let mut state: FakeState = read(op, args[0])?;
                let ballot: FakeBallot = read(op, args[1])?;

                state.messages_out.clear();
                let living = state.living();
                let mut tally: BTreeMap<PlayerId, usize> = BTreeMap::new();
                for (source, target) in &ballot {
                    if living.contains(source) {
                        *tally.entry(*target).or_default() += 1;
                    }
                }
                let lynched = tally
                    .iter()
                    .max_by_key(|(_, count)| *count)
                    .map(|(target, _)| *target);
                if let Some(target) = lynched {
                    kill(&mut state, target, "lynched");
                }
                state.turn += 1;
                state.apply_win_rules();
                write(op, args[2], &state)?;
                Ok(serde_json::Value::Null)
            }

            EngineOp::AdminKill => {
                let mut state: FakeState = read(op, args[0])?;
                let order: KillOrder = decode_input(op, input)?;
                kill(&mut state, order.target, &order.reason);
                state.apply_win_rules();
                write(op, args[1], &state)?;
                Ok(serde_json::Value::Null)
            }
        }
    }
}
