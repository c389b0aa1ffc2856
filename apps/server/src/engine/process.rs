use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{EngineError, EngineOp, RuleEngine};

/// Runs one engine executable per call from a configured directory,
/// mirroring the call contract in the module docs. Each invocation is
/// a bounded synchronous exchange from the session's point of view;
/// in-flight calls are not cancellable and are expected to complete or
/// fail outright.
pub struct ProcessEngine {
    bin_dir: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(bin_dir: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            extra_args,
        }
    }
}

#[async_trait]
impl RuleEngine for ProcessEngine {
    async fn call(
        &self,
        op: EngineOp,
        args: &[&Path],
        input: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        let program = self.bin_dir.join(op.program());

        debug!(op = op.program(), args = args.len(), "invoking engine");

        let mut command = Command::new(&program);
        command
            .args(&self.extra_args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            op: op.program(),
            source,
        })?;

        if let Some(payload) = &input {
            let bytes = serde_json::to_vec(payload).map_err(|source| EngineError::Decode {
                op: op.program(),
                source,
            })?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&bytes)
                    .await
                    .map_err(|source| EngineError::Spawn {
                        op: op.program(),
                        source,
                    })?;
                // Dropping stdin closes the pipe so the engine sees EOF.
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| EngineError::Spawn {
                op: op.program(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                op: op.program(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&output.stdout).map_err(|source| EngineError::Decode {
            op: op.program(),
            source,
        })
    }
}
