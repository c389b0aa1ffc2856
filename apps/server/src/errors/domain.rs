//! Domain-level error type used across the session service.
//!
//! This error type is HTTP-agnostic. Route handlers return
//! `Result<T, crate::error::AppError>` and convert from `DomainError`
//! using the provided `From<DomainError> for AppError` implementation;
//! the websocket layer maps it to a `rej` frame instead.

use thiserror::Error;

use crate::engine::EngineError;
use crate::store::StoreError;

/// Central domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Command not legal in the current phase (e.g. a plan edit during Day).
    #[error("wrong phase: {0}")]
    Phase(String),
    /// Input or business rule violation.
    #[error("validation error: {0}")]
    Validation(String),
    /// Write command from a dead player.
    #[error("player is dead: {0}")]
    Dead(String),
    /// Reference to a player this session does not know.
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    /// The external rule engine rejected or failed the call. The
    /// mutation was not applied and the store was not reloaded.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Persistence failure in the session state store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn phase(detail: impl Into<String>) -> Self {
        Self::Phase(detail.into())
    }
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }
    pub fn dead(detail: impl Into<String>) -> Self {
        Self::Dead(detail.into())
    }
    pub fn unknown_player(detail: impl Into<String>) -> Self {
        Self::UnknownPlayer(detail.into())
    }
}
