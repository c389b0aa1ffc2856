#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod auth;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod errors;
pub mod logbook;
pub mod projector;
pub mod routes;
pub mod sched;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod ws;

// Re-exports for public API
pub use auth::{mint_admin_token, mint_player_token, verify_admin_token, verify_player_token};
pub use config::ServerConfig;
pub use error::AppError;
pub use state::app_state::AppState;

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
