//! Session orchestration: the single mutation pipeline.
//!
//! Every state change — client command, scheduled resolution, admin
//! action — runs the same sequence under one async mutex: validate
//! against the current phase, call the engine, reload the snapshot,
//! reproject views, and fan out only-changed updates through the hub.
//! The mutex is the serialization point the rest of the crate relies
//! on; nothing mutates the store without holding it.

use std::collections::BTreeMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::schedule::{next_deadline, twilight_deadline};
use crate::domain::{DayResult, NightResult, Phase, PlayerId, PlayerRecord, Turn};
use crate::engine::{EngineClient, KillOrder, PlanSubmission, VoteSubmission};
use crate::error::AppError;
use crate::errors::domain::DomainError;
use crate::logbook::{Logbook, ReconcileReport};
use crate::projector::{
    self, PhaseView, ProjectionCtx,
};
use crate::sched::SchedCommand;
use crate::store::GameStore;
use crate::ws::hub::WsHub;
use crate::ws::protocol::{CommandKind, PendBody, RootBody, ServerMsg};

struct SessionCore {
    store: GameStore,
    engine: EngineClient,
    logbook: Logbook,
    /// Engine-owned player records, refreshed after every snapshot
    /// rewrite.
    players: BTreeMap<PlayerId, PlayerRecord>,
}

pub struct SessionService {
    core: Mutex<SessionCore>,
    hub: Arc<WsHub>,
    sched: mpsc::Sender<SchedCommand>,
}

impl SessionCore {
    fn ctx(&self) -> ProjectionCtx<'_> {
        ProjectionCtx {
            meta: self.store.meta(),
            players: &self.players,
        }
    }

    async fn refresh_players(&mut self) -> Result<(), DomainError> {
        self.players = self.engine.view_players(&self.store.state_path()).await?;
        Ok(())
    }

    /// Full root views for the given players, fetching each engine
    /// artifact once regardless of how many viewers need it.
    async fn roots(
        &self,
        viewers: &[PlayerId],
    ) -> Result<BTreeMap<PlayerId, RootBody>, DomainError> {
        let phase = self.store.current_phase();
        let turn = self.store.current_turn();

        enum PhaseData {
            Night(Vec<crate::domain::PlanEntry>),
            Day(crate::projector::BallotView),
            End(Vec<String>),
        }

        let data = match phase {
            Phase::Night => PhaseData::Night(
                self.engine
                    .view_plan(&self.store.state_path(), &self.store.plan_path())
                    .await?,
            ),
            Phase::Day => {
                let ballot = self.engine.view_ballot(&self.store.ballot_path()).await?;
                PhaseData::Day(projector::ballot_view(self.ctx(), &ballot))
            }
            Phase::End => {
                let winners = self
                    .engine
                    .view_winners(&self.store.state_path())
                    .await?
                    .unwrap_or_default();
                PhaseData::End(projector::winners_view(self.store.meta(), &winners))
            }
        };

        let public = projector::public_view(self.ctx(), turn);
        let mut roots = BTreeMap::new();
        for viewer in viewers {
            let phase_view = match &data {
                PhaseData::Night(entries) => {
                    let mine = projector::filter_plan(entries, *viewer);
                    PhaseView::Night {
                        plan: projector::plan_view(self.store.meta(), &mine),
                    }
                }
                PhaseData::Day(ballot) => PhaseView::Day {
                    ballot: ballot.clone(),
                },
                PhaseData::End(winners) => PhaseView::End {
                    winners: winners.clone(),
                },
            };
            roots.insert(
                *viewer,
                RootBody {
                    public: Some(public.clone()),
                    identity: Some(projector::identity_view(self.ctx(), *viewer)),
                    phase: Some(phase_view),
                    ..RootBody::default()
                },
            );
        }
        Ok(roots)
    }

    fn require_phase(&self, expected: Phase) -> Result<(), DomainError> {
        let current = self.store.current_phase();
        if current != expected {
            return Err(DomainError::phase(format!(
                "command requires {} but the session is in {}",
                expected.label(),
                current.label()
            )));
        }
        Ok(())
    }

    fn resolve_name(&self, name: &str) -> Result<PlayerId, DomainError> {
        self.store
            .meta()
            .player_id_by_name(name)
            .ok_or_else(|| DomainError::validation(format!("unknown player name {name:?}")))
    }

    fn resolve_targets(&self, names: &[String]) -> Result<Vec<PlayerId>, DomainError> {
        names.iter().map(|n| self.resolve_name(n)).collect()
    }

    fn is_dead(&self, player: PlayerId) -> bool {
        self.players
            .get(&player)
            .map(|r| r.is_dead())
            .unwrap_or(false)
    }

    /// After a snapshot rewrite, check for winners and enter the
    /// terminal phase if the engine reports any.
    async fn check_winners(&mut self) -> Result<bool, DomainError> {
        if self.store.current_phase().is_terminal() {
            return Ok(true);
        }
        let winners = self.engine.view_winners(&self.store.state_path()).await?;
        if let Some(winners) = winners {
            info!(count = winners.len(), "session reached its end condition");
            match self.store.current_phase() {
                Phase::Night => self.store.remove_plan()?,
                Phase::Day => self.store.remove_ballot()?,
                Phase::End => {}
            }
            self.store.meta_mut().phase = Phase::End;
            self.store.meta_mut().schedule.phase_end = None;
            self.store.save_meta()?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl SessionService {
    pub async fn start(
        store: GameStore,
        engine: EngineClient,
        hub: Arc<WsHub>,
        sched: mpsc::Sender<SchedCommand>,
    ) -> Result<Self, AppError> {
        let mut core = SessionCore {
            store,
            engine,
            logbook: Logbook::new(),
            players: BTreeMap::new(),
        };
        core.refresh_players().await?;

        // First boot of a session has no deadline yet. Create the
        // phase's working set before arming the clock.
        if core.store.meta().schedule.phase_end.is_none()
            && !core.store.current_phase().is_terminal()
        {
            let phase = core.store.current_phase();
            match phase {
                Phase::Night => core.store.make_plan()?,
                Phase::Day => core.store.make_ballot()?,
                Phase::End => {}
            }
            let deadline = next_deadline(
                &core.store.meta().schedule,
                phase,
                None,
                OffsetDateTime::now_utc(),
            )?;
            core.store.meta_mut().schedule.phase_end = deadline;
            core.store.save_meta()?;
            info!(deadline = ?deadline, phase = phase.label(), "initialized phase deadline");
        }

        Ok(Self {
            core: Mutex::new(core),
            hub,
            sched,
        })
    }

    pub async fn current_deadline(&self) -> Option<i64> {
        self.core.lock().await.store.meta().schedule.phase_end
    }

    pub async fn is_known_player(&self, player: PlayerId) -> bool {
        self.core
            .lock()
            .await
            .store
            .meta()
            .players
            .contains_key(&player)
    }

    /// Full root for a freshly connected client, including the
    /// projected outcomes of every phase already resolved so a
    /// reconnecting player can catch up on what happened.
    pub async fn connect_root(&self, player: PlayerId) -> Result<RootBody, AppError> {
        let core = self.core.lock().await;
        let mut roots = core.roots(&[player]).await?;
        let mut root = roots
            .remove(&player)
            .ok_or_else(|| AppError::internal("projection produced no root".to_string()))?;

        let mut night_results = BTreeMap::new();
        let mut day_results = BTreeMap::new();
        for turn in 1..=core.store.current_turn() {
            match core.store.read_night_result(turn) {
                Ok(result) => {
                    night_results.insert(
                        turn,
                        projector::night_result_view(core.store.meta(), &result, player),
                    );
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
            match core.store.read_day_result(turn) {
                Ok(result) => {
                    day_results
                        .insert(turn, projector::day_result_view(core.store.meta(), &result));
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }
        root.night_results = (!night_results.is_empty()).then_some(night_results);
        root.day_results = (!day_results.is_empty()).then_some(day_results);
        Ok(root)
    }

    /// Handle one client command end to end. An `Ok` here is the `ack`;
    /// any error becomes the `rej`.
    pub async fn handle_command(
        &self,
        player: PlayerId,
        kind: CommandKind,
    ) -> Result<(), AppError> {
        let mut core = self.core.lock().await;

        if core.store.current_phase().is_terminal() {
            return Err(DomainError::phase("the game has ended").into());
        }
        if !core.store.meta().players.contains_key(&player) {
            return Err(DomainError::unknown_player(format!("player {player}")).into());
        }
        if core.is_dead(player) {
            return Err(DomainError::dead(format!(
                "{} is dead",
                core.store.meta().player_name(player)
            ))
            .into());
        }

        let watchers = self.hub.connected_players();
        let before = core.roots(&watchers).await?;

        match kind {
            CommandKind::Plan {
                action_index,
                targets,
            } => self.apply_plan(&mut core, player, action_index, targets).await?,
            CommandKind::Vote { target } => self.apply_vote(&mut core, player, target).await?,
            CommandKind::Impulse {
                action_index,
                targets,
            } => {
                self.apply_impulse(&mut core, player, action_index, targets)
                    .await?
            }
            CommandKind::Will { text } => {
                let meta = core.store.meta_mut();
                if let Some(entry) = meta.players.get_mut(&player) {
                    entry.will = text;
                }
                core.store.save_meta()?;
            }
        }

        let after = core.roots(&watchers).await?;
        self.push_changed(&before, &after);
        Ok(())
    }

    async fn apply_plan(
        &self,
        core: &mut SessionCore,
        player: PlayerId,
        action_index: usize,
        targets: Option<Vec<String>>,
    ) -> Result<(), AppError> {
        core.require_phase(Phase::Night)?;

        let entries = core
            .engine
            .view_plan(&core.store.state_path(), &core.store.plan_path())
            .await
            .map_err(DomainError::from)?;
        let mine = projector::filter_plan(&entries, player);
        let entry = mine.get(action_index).ok_or_else(|| {
            DomainError::validation(format!("no plan action at index {action_index}"))
        })?;

        let submission = PlanSubmission {
            action_group: entry.action_group,
            action: entry.action,
            source: player,
            targets: targets
                .map(|names| core.resolve_targets(&names))
                .transpose()?,
        };
        core.engine
            .submit_plan(&core.store.state_path(), &core.store.plan_path(), &submission)
            .await
            .map_err(DomainError::from)?;
        Ok(())
    }

    async fn apply_vote(
        &self,
        core: &mut SessionCore,
        player: PlayerId,
        target: Option<String>,
    ) -> Result<(), AppError> {
        core.require_phase(Phase::Day)?;

        // The ballot freezes once the deadline elapses, even while a
        // failed resolution has the scheduler halted.
        if let Some(end) = core.store.meta().schedule.phase_end {
            if OffsetDateTime::now_utc().unix_timestamp() >= end {
                return Err(DomainError::phase("the day deadline has passed").into());
            }
        }

        let submission = VoteSubmission {
            source: player,
            target: target.as_deref().map(|n| core.resolve_name(n)).transpose()?,
        };
        let outcome = core
            .engine
            .submit_vote(&core.store.state_path(), &core.store.ballot_path(), &submission)
            .await
            .map_err(DomainError::from)?;

        if outcome.consensus {
            let shortened =
                twilight_deadline(&core.store.meta().schedule, OffsetDateTime::now_utc());
            if shortened != core.store.meta().schedule.phase_end {
                info!(deadline = ?shortened, "vote consensus reached, entering twilight");
                core.store.meta_mut().schedule.phase_end = shortened;
                core.store.save_meta()?;
                let _ = self.sched.try_send(SchedCommand::Rearm(shortened));
            }
        }
        Ok(())
    }

    async fn apply_impulse(
        &self,
        core: &mut SessionCore,
        player: PlayerId,
        action_index: usize,
        targets: Vec<String>,
    ) -> Result<(), AppError> {
        core.require_phase(Phase::Day)?;

        // Day actions are addressed through the listing the player saw
        // at the top of the phase: the plan archived when night closed.
        let turn = core.store.current_turn();
        let archived_plan = core.store.archived_plan_path(turn);
        let entries = core
            .engine
            .view_plan(&core.store.state_path(), &archived_plan)
            .await
            .map_err(DomainError::from)?;
        let mine = projector::filter_plan(&entries, player);
        let entry = mine.get(action_index).ok_or_else(|| {
            DomainError::validation(format!("no action at index {action_index}"))
        })?;

        let submission = PlanSubmission {
            action_group: entry.action_group,
            action: entry.action,
            source: player,
            targets: Some(core.resolve_targets(&targets)?),
        };
        core.engine
            .impulse(&core.store.state_path(), &core.store.state_path(), &submission)
            .await
            .map_err(DomainError::from)?;

        core.store.reload_turn()?;
        core.refresh_players().await?;
        if core.check_winners().await? {
            let _ = self.sched.try_send(SchedCommand::Rearm(None));
        }
        Ok(())
    }

    /// Resolve the phase whose deadline elapsed. Returns the next
    /// deadline; `None` halts the scheduler (terminal phase, or after
    /// a resolution failure surfaced as `Err`).
    pub async fn resolve_due(&self) -> Result<Option<i64>, AppError> {
        let mut core = self.core.lock().await;
        match core.store.current_phase() {
            Phase::Night => self.resolve_night(&mut core).await,
            Phase::Day => self.resolve_day(&mut core).await,
            Phase::End => Ok(None),
        }
    }

    async fn resolve_night(&self, core: &mut SessionCore) -> Result<Option<i64>, AppError> {
        let turn = core.store.current_turn();
        info!(turn, "resolving night");

        let (dawn_state, plan) = core.store.archive_night_inputs(turn)?;
        core.engine
            .resolve_night(&dawn_state, &plan, &core.store.state_path())
            .await
            .map_err(DomainError::from)?;

        core.store.reload_turn()?;
        core.refresh_players().await?;

        let state = core.store.state_path();
        let used_plan = core
            .engine
            .view_plan(&dawn_state, &plan)
            .await
            .map_err(DomainError::from)?;
        let result = NightResult {
            messages: core
                .engine
                .view_messages(&dawn_state, &state)
                .await
                .map_err(DomainError::from)?,
            deaths: core
                .engine
                .view_deaths(&dawn_state, &state)
                .await
                .map_err(DomainError::from)?,
            used_plan,
        };
        core.store.write_night_result(turn, &result)?;
        self.reconcile_closed(core, turn, Phase::Night, &result.used_plan)
            .await;

        core.store.remove_plan()?;
        let ended = core.check_winners().await?;
        let next = if ended { Phase::End } else { Phase::Day };
        if next == Phase::Day {
            core.store.make_ballot()?;
            self.enter_phase(core, Phase::Day)?;
        }

        self.push_pend(core, turn, Phase::Night, Some(&result), None)
            .await;
        Ok(core.store.meta().schedule.phase_end)
    }

    async fn resolve_day(&self, core: &mut SessionCore) -> Result<Option<i64>, AppError> {
        let turn = core.store.current_turn();
        info!(turn, "resolving day");

        let (dusk_state, ballot) = core.store.archive_day_inputs(turn)?;
        core.engine
            .resolve_day(&dusk_state, &ballot, &core.store.state_path())
            .await
            .map_err(DomainError::from)?;

        core.store.reload_turn()?;
        core.refresh_players().await?;

        let state = core.store.state_path();
        let result = DayResult {
            used_ballot: core
                .engine
                .view_ballot(&ballot)
                .await
                .map_err(DomainError::from)?,
            deaths: core
                .engine
                .view_deaths(&dusk_state, &state)
                .await
                .map_err(DomainError::from)?,
        };
        core.store.write_day_result(turn, &result)?;
        self.reconcile_closed(core, turn, Phase::Day, &[]).await;

        core.store.remove_ballot()?;
        let ended = core.check_winners().await?;
        let next = if ended { Phase::End } else { Phase::Night };
        if next == Phase::Night {
            core.store.make_plan()?;
            self.enter_phase(core, Phase::Night)?;
        }

        self.push_pend(core, turn, Phase::Day, None, Some(&result))
            .await;
        Ok(core.store.meta().schedule.phase_end)
    }

    /// Set the new phase and its deadline, anchored to the deadline
    /// just passed.
    fn enter_phase(&self, core: &mut SessionCore, phase: Phase) -> Result<(), AppError> {
        let previous = core.store.meta().schedule.phase_end;
        let deadline = next_deadline(
            &core.store.meta().schedule,
            phase,
            previous,
            OffsetDateTime::now_utc(),
        )?;
        core.store.meta_mut().phase = phase;
        core.store.meta_mut().schedule.phase_end = deadline;
        core.store.save_meta()?;
        info!(phase = phase.label(), deadline = ?deadline, "entered phase");
        Ok(())
    }

    /// Cache the closed phase's reconciled log. Reconciliation errors
    /// are logged inside the reconciler and surface as unresolved
    /// entries; they never fail the resolution.
    async fn reconcile_closed(
        &self,
        core: &mut SessionCore,
        turn: Turn,
        phase: Phase,
        used_plan: &[crate::domain::PlanEntry],
    ) {
        let history = match core.engine.view_history(&core.store.state_path()).await {
            Ok(history) => history,
            Err(err) => {
                error!(error = %err, "history unavailable, skipping log reconciliation");
                return;
            }
        };
        let executed = history
            .get(&turn)
            .and_then(|phases| phases.get(&phase))
            .cloned()
            .unwrap_or_default();
        let report = core
            .logbook
            .closed_phase(turn, phase, used_plan, &executed);
        if !report.unresolved.is_empty() {
            warn!(
                turn,
                phase = phase.label(),
                unresolved = report.unresolved.len(),
                "log reconciliation left unresolved acts"
            );
        }
    }

    /// Reconciled log for a turn's phase, for the admin surface. The
    /// still-open phase is recomputed on demand; closed phases come
    /// from the cache seeded at resolution time.
    pub async fn reconciled_log(
        &self,
        turn: Turn,
        phase: Phase,
    ) -> Result<ReconcileReport, AppError> {
        let mut core = self.core.lock().await;
        let open = turn == core.store.current_turn() && phase == core.store.current_phase();

        let used_plan = if phase == Phase::Night {
            if open {
                core.engine
                    .view_plan(&core.store.state_path(), &core.store.plan_path())
                    .await
                    .map_err(DomainError::from)?
            } else {
                core.store.read_night_result(turn)?.used_plan
            }
        } else {
            Vec::new()
        };
        let history = core
            .engine
            .view_history(&core.store.state_path())
            .await
            .map_err(DomainError::from)?;
        let executed = history
            .get(&turn)
            .and_then(|phases| phases.get(&phase))
            .cloned()
            .unwrap_or_default();
        if open {
            Ok(core.logbook.open_phase(&used_plan, &executed))
        } else {
            Ok(core
                .logbook
                .closed_phase(turn, phase, &used_plan, &executed)
                .clone())
        }
    }

    async fn push_pend(
        &self,
        core: &SessionCore,
        turn: Turn,
        closed: Phase,
        night: Option<&NightResult>,
        day: Option<&DayResult>,
    ) {
        let watchers = self.hub.connected_players();
        let roots = match core.roots(&watchers).await {
            Ok(roots) => roots,
            Err(err) => {
                error!(error = %err, "failed to project views for phase push");
                return;
            }
        };

        for (player, root) in roots {
            let body = PendBody {
                turn,
                closed,
                night_result: night
                    .map(|result| projector::night_result_view(core.store.meta(), result, player)),
                day_result: day.map(|result| projector::day_result_view(core.store.meta(), result)),
                root,
            };
            self.hub.send_to(player, &ServerMsg::Pend { body });
        }
    }

    /// Push a partial root to every watcher whose view actually
    /// changed; identical projections produce no traffic.
    fn push_changed(
        &self,
        before: &BTreeMap<PlayerId, RootBody>,
        after: &BTreeMap<PlayerId, RootBody>,
    ) {
        for (player, new) in after {
            let old = before.get(player);
            let diff = RootBody {
                public: pick_changed(old.and_then(|o| o.public.as_ref()), new.public.as_ref()),
                identity: pick_changed(
                    old.and_then(|o| o.identity.as_ref()),
                    new.identity.as_ref(),
                ),
                phase: pick_changed(old.and_then(|o| o.phase.as_ref()), new.phase.as_ref()),
                ..RootBody::default()
            };
            if !diff.is_empty() {
                self.hub.send_to(*player, &ServerMsg::Root { body: diff });
            }
        }
    }

    // --- administrative surface ---

    /// Human-readable dump of the live working set.
    pub async fn peek(&self) -> Result<String, AppError> {
        let core = self.core.lock().await;
        match core.store.current_phase() {
            Phase::Night => {
                let entries = core
                    .engine
                    .view_plan(&core.store.state_path(), &core.store.plan_path())
                    .await
                    .map_err(DomainError::from)?;
                Ok(projector::peek_lines(core.store.meta(), &entries))
            }
            Phase::Day => {
                let ballot = core
                    .engine
                    .view_ballot(&core.store.ballot_path())
                    .await
                    .map_err(DomainError::from)?;
                let meta = core.store.meta();
                Ok(ballot
                    .iter()
                    .filter_map(|(source, target)| {
                        let target = target.as_ref()?;
                        Some(format!(
                            "{}: vote {}",
                            meta.player_name(*source),
                            meta.player_name(*target)
                        ))
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Phase::End => Ok(String::new()),
        }
    }

    /// Force the pending transition to fire now.
    pub async fn poke(&self) {
        let _ = self.sched.try_send(SchedCommand::Poke);
    }

    /// Force a player's death with a stated reason.
    pub async fn modkill(&self, name: &str, reason: String) -> Result<(), AppError> {
        let mut core = self.core.lock().await;
        if core.store.current_phase().is_terminal() {
            return Err(DomainError::phase("the game has ended").into());
        }
        let target = core
            .store
            .meta()
            .player_id_by_name(name)
            .ok_or_else(|| DomainError::unknown_player(format!("player {name:?}")))?;

        let watchers = self.hub.connected_players();
        let before = core.roots(&watchers).await?;

        let order = KillOrder { target, reason };
        core.engine
            .admin_kill(&core.store.state_path(), &core.store.state_path(), &order)
            .await
            .map_err(DomainError::from)?;
        core.store.reload_turn()?;
        core.refresh_players().await?;
        if core.check_winners().await? {
            let _ = self.sched.try_send(SchedCommand::Rearm(None));
        }

        let after = core.roots(&watchers).await?;
        self.push_changed(&before, &after);
        Ok(())
    }

    /// Tell every connected client to reload from scratch.
    pub async fn broadcast_refresh(&self) {
        self.hub.broadcast(&ServerMsg::Refresh);
    }
}


fn pick_changed<T: Clone + PartialEq>(old: Option<&T>, new: Option<&T>) -> Option<T> {
    match (old, new) {
        (Some(o), Some(n)) if o == n => None,
        (_, Some(n)) => Some(n.clone()),
        (_, None) => None,
    }
}
