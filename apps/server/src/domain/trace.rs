use serde::{Deserialize, Serialize};

use super::ids::ActionGroupId;

/// Provenance metadata attached to every executed act. The engine
/// guarantees every `FromRewrite` chain terminates at a `FromPlan`
/// root within the same phase; the log reconciler still checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActTrace {
    /// The act executed straight out of a submitted plan slot.
    FromPlan { action_group: ActionGroupId },
    /// The act was created by another act's trigger (redirect, drive,
    /// deflect, ...). `dependent` is the trace of the triggering act.
    FromRewrite { trigger: u32, dependent: Box<ActTrace> },
}

/// A trace chain unwound to its plan root. `triggers` is ordered
/// root-first, so following it from the root's log node locates the
/// nested node this act belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePath {
    pub root: ActionGroupId,
    pub triggers: Vec<u32>,
}

impl ActTrace {
    /// Walk the dependency chain to the plan root, iteratively. The
    /// chain is acyclic by construction (owned boxes), so this always
    /// terminates; depth is still bounded upstream by the JSON
    /// decoder's recursion limit.
    pub fn unwind(&self) -> TracePath {
        let mut triggers = Vec::new();
        let mut cur = self;
        loop {
            match cur {
                ActTrace::FromPlan { action_group } => {
                    triggers.reverse();
                    return TracePath {
                        root: *action_group,
                        triggers,
                    };
                }
                ActTrace::FromRewrite { trigger, dependent } => {
                    triggers.push(*trigger);
                    cur = dependent;
                }
            }
        }
    }
}
