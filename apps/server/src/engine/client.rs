use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EngineError, EngineOp, RuleEngine};
use crate::domain::{
    ActionGroupId, ActionId, History, Message, PlanEntry, PlayerId, PlayerRecord,
};

/// Payload of a `submit-plan` (and `impulse`) call. `targets: None`
/// fully retracts the group's submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSubmission {
    pub action_group: ActionGroupId,
    pub action: ActionId,
    pub source: PlayerId,
    pub targets: Option<Vec<PlayerId>>,
}

/// Payload of a `submit-vote` call. `target: None` retracts the vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub source: PlayerId,
    pub target: Option<PlayerId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteOutcome {
    /// True when the ballot has reached consensus; the scheduler may
    /// shorten the deadline to the twilight window in response.
    pub consensus: bool,
}

/// Payload of an `admin-kill` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillOrder {
    pub target: PlayerId,
    pub reason: String,
}

/// Typed wrappers over the raw engine call interface. Marshaling only;
/// no logic of its own.
#[derive(Clone)]
pub struct EngineClient {
    engine: Arc<dyn RuleEngine>,
}

impl EngineClient {
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self { engine }
    }

    async fn view<T: serde::de::DeserializeOwned>(
        &self,
        op: EngineOp,
        args: &[&Path],
    ) -> Result<T, EngineError> {
        let raw = self.engine.call(op, args, None).await?;
        serde_json::from_value(raw).map_err(|source| EngineError::Decode {
            op: op.program(),
            source,
        })
    }

    pub async fn view_plan(&self, state: &Path, plan: &Path) -> Result<Vec<PlanEntry>, EngineError> {
        self.view(EngineOp::ViewPlan, &[state, plan]).await
    }

    pub async fn view_ballot(
        &self,
        ballot: &Path,
    ) -> Result<BTreeMap<PlayerId, Option<PlayerId>>, EngineError> {
        self.view(EngineOp::ViewBallot, &[ballot]).await
    }

    pub async fn view_history(&self, state: &Path) -> Result<History, EngineError> {
        self.view(EngineOp::ViewHistory, &[state]).await
    }

    pub async fn view_messages(
        &self,
        pre_state: &Path,
        post_state: &Path,
    ) -> Result<Vec<Message>, EngineError> {
        self.view(EngineOp::ViewMessages, &[pre_state, post_state])
            .await
    }

    pub async fn view_deaths(
        &self,
        pre_state: &Path,
        post_state: &Path,
    ) -> Result<BTreeMap<PlayerId, String>, EngineError> {
        self.view(EngineOp::ViewDeaths, &[pre_state, post_state])
            .await
    }

    pub async fn view_players(
        &self,
        state: &Path,
    ) -> Result<BTreeMap<PlayerId, PlayerRecord>, EngineError> {
        self.view(EngineOp::ViewPlayers, &[state]).await
    }

    pub async fn view_winners(&self, state: &Path) -> Result<Option<Vec<PlayerId>>, EngineError> {
        self.view(EngineOp::ViewWinners, &[state]).await
    }

    /// Edit the live plan in place. Fails atomically: on error the plan
    /// file is untouched.
    pub async fn submit_plan(
        &self,
        state: &Path,
        plan: &Path,
        submission: &PlanSubmission,
    ) -> Result<(), EngineError> {
        self.engine
            .call(
                EngineOp::SubmitPlan,
                &[state, plan],
                Some(encode(EngineOp::SubmitPlan, submission)?),
            )
            .await
            .map(|_| ())
    }

    pub async fn submit_vote(
        &self,
        state: &Path,
        ballot: &Path,
        submission: &VoteSubmission,
    ) -> Result<VoteOutcome, EngineError> {
        let raw = self
            .engine
            .call(
                EngineOp::SubmitVote,
                &[state, ballot],
                Some(encode(EngineOp::SubmitVote, submission)?),
            )
            .await?;
        serde_json::from_value(raw).map_err(|source| EngineError::Decode {
            op: EngineOp::SubmitVote.program(),
            source,
        })
    }

    /// Execute a day-phase impulse act immediately against the live
    /// snapshot, writing the new snapshot to `out_state`.
    pub async fn impulse(
        &self,
        state: &Path,
        out_state: &Path,
        submission: &PlanSubmission,
    ) -> Result<(), EngineError> {
        self.engine
            .call(
                EngineOp::Impulse,
                &[state, out_state],
                Some(encode(EngineOp::Impulse, submission)?),
            )
            .await
            .map(|_| ())
    }

    /// Resolve the night: consume the archived pre-phase snapshot and
    /// plan, writing the new snapshot to `out_state`.
    pub async fn resolve_night(
        &self,
        pre_state: &Path,
        plan: &Path,
        out_state: &Path,
    ) -> Result<(), EngineError> {
        self.engine
            .call(EngineOp::ResolveNight, &[pre_state, plan, out_state], None)
            .await
            .map(|_| ())
    }

    pub async fn resolve_day(
        &self,
        pre_state: &Path,
        ballot: &Path,
        out_state: &Path,
    ) -> Result<(), EngineError> {
        self.engine
            .call(EngineOp::ResolveDay, &[pre_state, ballot, out_state], None)
            .await
            .map(|_| ())
    }

    pub async fn admin_kill(
        &self,
        state: &Path,
        out_state: &Path,
        order: &KillOrder,
    ) -> Result<(), EngineError> {
        self.engine
            .call(
                EngineOp::AdminKill,
                &[state, out_state],
                Some(encode(EngineOp::AdminKill, order)?),
            )
            .await
            .map(|_| ())
    }
}

fn encode<T: Serialize>(op: EngineOp, value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|source| EngineError::Decode {
        op: op.program(),
        source,
    })
}
