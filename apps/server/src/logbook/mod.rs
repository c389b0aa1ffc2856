//! Causal reconciliation of planned vs. executed acts.
//!
//! After a phase resolves, the engine's history lists what actually
//! ran, each act carrying a provenance trace back to a plan slot or to
//! the act that rewrote it. The reconciler rebuilds a per-phase tree
//! keyed by action group: what the group planned, what finally
//! executed, and any triggered acts nested beneath the trigger indices
//! that caused them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::error;

use crate::domain::{ActTrace, ActionGroupId, ActionId, ExecutedAct, Phase, PlanEntry, PlayerId, Turn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActSummary {
    pub action: ActionId,
    pub source: PlayerId,
    pub targets: Vec<PlayerId>,
}

impl From<&ExecutedAct> for ActSummary {
    fn from(act: &ExecutedAct) -> Self {
        Self {
            action: act.action,
            source: act.source,
            targets: act.targets.clone(),
        }
    }
}

/// One node of the reconciled tree. `planned` is cleared when the
/// final act matches the submission exactly, so a populated `planned`
/// always means "this differs from what was submitted".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogNode {
    pub planned: Option<ActSummary>,
    #[serde(rename = "final")]
    pub outcome: Option<ActSummary>,
    pub triggers: BTreeMap<u32, LogNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub tree: BTreeMap<ActionGroupId, LogNode>,
    /// Acts whose trace could not be tied back to a known plan root.
    /// A non-empty list is an engine/orchestrator protocol mismatch;
    /// the acts are surfaced here rather than dropped.
    pub unresolved: Vec<ExecutedAct>,
}

/// Rebuild the tree for one (turn, phase) from the plan as it stood at
/// the top of the phase and the executed acts in engine-assigned order.
pub fn reconcile(plan: &[PlanEntry], executed: &[ExecutedAct]) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for entry in plan {
        let node = report.tree.entry(entry.action_group).or_default();
        if let Some(act) = &entry.act {
            node.planned = Some(ActSummary {
                action: entry.action,
                source: entry.source,
                targets: act.targets.clone(),
            });
        }
    }

    // A plan-originated act legitimizes its group even when no plan
    // file existed for the phase (day impulses).
    let mut known_roots: BTreeSet<ActionGroupId> =
        report.tree.keys().copied().collect();
    for act in executed {
        if let ActTrace::FromPlan { action_group } = act.trace {
            known_roots.insert(action_group);
        }
    }

    for act in executed {
        let path = act.trace.unwind();
        if !known_roots.contains(&path.root) {
            error!(
                action_group = %path.root,
                action = %act.action,
                "executed act traces to an unknown plan root"
            );
            report.unresolved.push(act.clone());
            continue;
        }

        let mut node = report.tree.entry(path.root).or_default();
        for index in &path.triggers {
            node = node.triggers.entry(*index).or_default();
        }
        node.outcome = Some(ActSummary::from(act));
        if node.outcome == node.planned {
            // Executed exactly as submitted; nothing extra to report.
            node.planned = None;
        }
    }

    report
}

/// Per-phase reconciliation with a cache for closed phases. The open
/// phase is always recomputed; a closed phase's inputs are immutable,
/// so its first reconciliation is final.
#[derive(Default)]
pub struct Logbook {
    closed: BTreeMap<(Turn, Phase), ReconcileReport>,
}

impl Logbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed_phase(
        &mut self,
        turn: Turn,
        phase: Phase,
        plan: &[PlanEntry],
        executed: &[ExecutedAct],
    ) -> &ReconcileReport {
        self.closed
            .entry((turn, phase))
            .or_insert_with(|| reconcile(plan, executed))
    }

    pub fn open_phase(&self, plan: &[PlanEntry], executed: &[ExecutedAct]) -> ReconcileReport {
        reconcile(plan, executed)
    }
}
