/*
 * Copyright (C) 2025 The Vktty Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time;

use crate::vktty::logger::{log, Level};
use crate::vktty::observability::metrics;
use crate::vktty::util::{DynError, Fault};

/// Hard deadline for one lifecycle-script invocation; the child is killed on
/// expiry.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(180);

const COMPONENT: &str = "executor";

/// Lifecycle operations understood by the operator-supplied script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Delete,
    Get,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Get => "get",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload the script prints on stdout. `status == 0` is logical success;
/// `key` is meaningful for `create` and `get` only.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecResult {
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "Key", default)]
    pub key: String,
}

/// Failure taxonomy of a script invocation. `NotFound` and `AlreadyExists`
/// are recognized from stderr substrings and drive pool-level recovery; the
/// rest quarantine the slot as `Error`.
#[derive(Debug)]
pub enum ExecError {
    Unexpected(DynError),
    Parsing(DynError),
    AlreadyExists,
    NotFound,
    Unknown { status: i64, stderr: String },
}

impl ExecError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::Unexpected(_) => "unexpected",
            ExecError::Parsing(_) => "parsing",
            ExecError::AlreadyExists => "already_exists",
            ExecError::NotFound => "not_found",
            ExecError::Unknown { .. } => "unknown",
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Unexpected(err) => write!(f, "unexpected script failure: {err}"),
            ExecError::Parsing(err) => write!(f, "failed to parse script output: {err}"),
            ExecError::AlreadyExists => f.write_str("cluster already exists"),
            ExecError::NotFound => f.write_str("couldn't find vcluster"),
            ExecError::Unknown { status, stderr } => {
                write!(f, "script failed with status {status}: {stderr}")
            }
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecError::Unexpected(err) | ExecError::Parsing(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Seam between the pool and the lifecycle subprocess, so tests can script
/// outcomes without forking.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, action: Action, id: usize) -> Result<ExecResult, ExecError>;
}

/// Production runner: spawns `<script> <action> <id>`, captures both streams,
/// and enforces the invocation deadline. Stateless; safe to call concurrently.
pub struct ScriptExecutor {
    script_path: PathBuf,
    timeout: Duration,
}

impl ScriptExecutor {
    pub fn new(script_path: PathBuf) -> Self {
        Self {
            script_path,
            timeout: EXEC_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(script_path: PathBuf, timeout: Duration) -> Self {
        Self {
            script_path,
            timeout,
        }
    }

    async fn invoke(&self, action: Action, id: usize) -> Result<ExecResult, ExecError> {
        let child = Command::new(&self.script_path)
            .arg(action.as_str())
            .arg(id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ExecError::Unexpected(Fault::wrap(
                    err,
                    format!("failed to spawn {}", self.script_path.display()),
                ))
            })?;

        // kill_on_drop reaps the child when the timeout abandons the wait.
        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(ExecError::Unexpected(Fault::wrap(
                    err,
                    "failed to collect script output",
                )))
            }
            Err(_) => {
                return Err(ExecError::Unexpected(Fault::new(format!(
                    "script timed out after {:?}",
                    self.timeout
                ))))
            }
        };

        Self::classify(output)
    }

    fn classify(output: std::process::Output) -> Result<ExecResult, ExecError> {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let result: ExecResult = serde_json::from_slice(&output.stdout).map_err(|err| {
            let stdout = String::from_utf8_lossy(&output.stdout);
            ExecError::Parsing(Fault::wrap(err, format!("stdout was '{}'", stdout.trim())))
        })?;

        if result.status != 0 {
            if stderr.contains("already exists") {
                return Err(ExecError::AlreadyExists);
            }
            if stderr.contains("couldn't find vcluster") {
                return Err(ExecError::NotFound);
            }
            return Err(ExecError::Unknown {
                status: result.status,
                stderr,
            });
        }

        Ok(result)
    }
}

#[async_trait]
impl ScriptRunner for ScriptExecutor {
    async fn run(&self, action: Action, id: usize) -> Result<ExecResult, ExecError> {
        let id_text = id.to_string();
        log(
            Level::Info,
            COMPONENT,
            "Run script",
            &[("action", action.as_str()), ("id", id_text.as_str())],
        );

        let started = Instant::now();
        let outcome = self.invoke(action, id).await;

        let elapsed = started.elapsed();
        metrics::observe_script_duration(action.as_str(), elapsed);
        let result_label = match &outcome {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::record_script_invocation(action.as_str(), result_label);

        let elapsed_text = format!("{:.3}s", elapsed.as_secs_f64());
        log(
            Level::Debug,
            COMPONENT,
            "Script finished",
            &[
                ("action", action.as_str()),
                ("id", id_text.as_str()),
                ("result", result_label),
                ("elapsed", elapsed_text.as_str()),
            ],
        );

        outcome
    }
}
