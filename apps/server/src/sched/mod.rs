//! Phase scheduler: one pending timer driving Night/Day resolution.
//!
//! The scheduler owns at most one deadline at a time. A `Poke` fires
//! the pending transition immediately; `Rearm` replaces the deadline
//! (twilight shortening, or disarming after the terminal phase). If a
//! scheduled resolution fails, the timer is left unarmed — firing the
//! same phase twice is worse than stalling, because the engine may
//! have partially run — and an operator poke is required to continue.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info};

use crate::session::SessionService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedCommand {
    /// Fire the pending transition now.
    Poke,
    /// Replace the pending deadline (None disarms).
    Rearm(Option<i64>),
}

pub fn channel() -> (mpsc::Sender<SchedCommand>, mpsc::Receiver<SchedCommand>) {
    mpsc::channel(16)
}

/// Spawn the scheduler loop. Runs until the command channel closes.
pub fn spawn(
    session: Arc<SessionService>,
    mut commands: mpsc::Receiver<SchedCommand>,
    initial_deadline: Option<i64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut deadline = initial_deadline;
        info!(deadline = ?deadline, "scheduler started");

        loop {
            let wake = deadline.map(instant_at);
            tokio::select! {
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    deadline = fire(&session).await;
                }
                cmd = commands.recv() => match cmd {
                    Some(SchedCommand::Poke) => {
                        deadline = fire(&session).await;
                    }
                    Some(SchedCommand::Rearm(next)) => {
                        info!(deadline = ?next, "scheduler rearmed");
                        deadline = next;
                    }
                    None => {
                        info!("scheduler command channel closed, stopping");
                        return;
                    }
                },
            }
        }
    })
}

async fn fire(session: &SessionService) -> Option<i64> {
    match session.resolve_due().await {
        Ok(next) => {
            info!(deadline = ?next, "phase resolved");
            next
        }
        Err(err) => {
            // Halt until an operator pokes; see module docs.
            error!(error = %err, "scheduled resolution failed, scheduling halted");
            None
        }
    }
}

fn instant_at(unix_ts: i64) -> Instant {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let delta = (unix_ts - now).max(0) as u64;
    Instant::now() + Duration::from_secs(delta)
}
