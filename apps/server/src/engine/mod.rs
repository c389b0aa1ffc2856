//! Typed client for the external rule-resolution engine.
//!
//! The engine is a black box reached through one executable per
//! operation: file-path arguments name the state records involved,
//! mutating calls take a JSON payload on stdin, and results come back
//! as JSON on stdout. A non-zero exit status means the call failed
//! atomically — the orchestrator treats the mutation as not applied
//! and never retries (the engine may have partially run; blind retry
//! is not assumed safe).

mod client;
mod process;

#[cfg(test)]
pub mod fake;

pub use client::{EngineClient, KillOrder, PlanSubmission, VoteOutcome, VoteSubmission};
pub use process::ProcessEngine;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// The engine's operation set. Kebab-case program names on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    ViewPlan,
    ViewBallot,
    ViewHistory,
    ViewMessages,
    ViewDeaths,
    ViewPlayers,
    ViewWinners,
    SubmitPlan,
    SubmitVote,
    Impulse,
    ResolveNight,
    ResolveDay,
    AdminKill,
}

impl EngineOp {
    pub fn program(self) -> &'static str {
        match self {
            EngineOp::ViewPlan => "view-plan",
            EngineOp::ViewBallot => "view-ballot",
            EngineOp::ViewHistory => "view-history",
            EngineOp::ViewMessages => "view-messages",
            EngineOp::ViewDeaths => "view-deaths",
            EngineOp::ViewPlayers => "view-players",
            EngineOp::ViewWinners => "view-winners",
            EngineOp::SubmitPlan => "submit-plan",
            EngineOp::SubmitVote => "submit-vote",
            EngineOp::Impulse => "impulse",
            EngineOp::ResolveNight => "resolve-night",
            EngineOp::ResolveDay => "resolve-day",
            EngineOp::AdminKill => "admin-kill",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine exited non-zero. `stderr` carries its diagnostic.
    #[error("engine op {op} failed (status {status}): {stderr}")]
    Failed {
        op: &'static str,
        status: i32,
        stderr: String,
    },
    #[error("engine op {op} could not be run: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("engine op {op} produced malformed output: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Seam between the orchestrator and the engine binaries. Production
/// uses [`ProcessEngine`]; tests drive the session against an
/// in-process fake.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn call(
        &self,
        op: EngineOp,
        args: &[&Path],
        input: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError>;
}
