//! Server configuration from the process environment.
//!
//! Environment variables must be set by the runtime environment
//! (docker env_file, or sourced env files in local dev):
//!   NOCTURNE_HOST          bind address, default 0.0.0.0
//!   NOCTURNE_PORT          bind port, default 8050
//!   NOCTURNE_GAME_DIR      game directory to serve (required)
//!   NOCTURNE_ENGINE_DIR    directory holding the engine executables
//!                          (required)
//!   NOCTURNE_ENGINE_ARGS   extra args prepended to every engine call,
//!                          whitespace-separated (optional)

pub mod schedule;

use std::env;
use std::path::PathBuf;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub game_dir: PathBuf,
    pub engine_dir: PathBuf,
    pub engine_args: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let host = env::var("NOCTURNE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("NOCTURNE_PORT")
            .unwrap_or_else(|_| "8050".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::config("NOCTURNE_PORT must be a valid port number".to_string()))?;

        let game_dir = PathBuf::from(must_var("NOCTURNE_GAME_DIR")?);
        let engine_dir = PathBuf::from(must_var("NOCTURNE_ENGINE_DIR")?);
        let engine_args = env::var("NOCTURNE_ENGINE_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            game_dir,
            engine_dir,
            engine_args,
        })
    }
}

fn must_var(name: &'static str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::config(format!("{name} must be set")))
}
