// src/exec/command.rs

//! Shell-command executor used by the `joindag` binary.

use std::process::Stdio;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::exec::backend::{Executor, WorkFuture, WorkRequest};
use crate::types::ResultMap;

/// Runs `payload.cmd` through the platform shell.
///
/// - The merge results published so far are written to the child's stdin as
///   one JSON object keyed by merge point id.
/// - `JOINDAG_TASK` is set to the task id.
/// - If stdout is a JSON object it becomes the task result; otherwise the
///   result is `{"stdout": <trimmed text>, "exit_code": 0}`.
/// - A non-zero exit status fails the task.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for CommandExecutor {
    fn execute(&self, request: WorkRequest) -> WorkFuture {
        Box::pin(async move {
            let cmd = match request.payload.get("cmd").and_then(Value::as_str) {
                Some(cmd) => cmd.to_string(),
                None => {
                    return Err(TaskError::failed(format!(
                        "payload of task '{}' has no `cmd` string",
                        request.name
                    )));
                }
            };

            run_command(&request, &cmd)
                .await
                .map_err(|e| TaskError::failed(format!("{e:#}")))
                .and_then(|output| output)
        })
    }
}

/// Outer `Result` is an IO failure, inner is the task's own verdict.
async fn run_command(
    request: &WorkRequest,
    cmd_line: &str,
) -> Result<std::result::Result<ResultMap, TaskError>> {
    info!(task = %request.name, cmd = %cmd_line, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    };

    cmd.env("JOINDAG_TASK", &request.name)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", request.name))?;

    if let Some(mut stdin) = child.stdin.take() {
        let merged = serde_json::to_vec(request.merged.as_ref())
            .context("serializing merged results for stdin")?;
        let task_name = request.name.clone();
        tokio::spawn(async move {
            // The child may exit without reading stdin; that is not an error.
            if let Err(e) = stdin.write_all(&merged).await {
                debug!(task = %task_name, error = %e, "child did not consume stdin");
            }
        });
    }

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let task_name = request.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    let mut stdout_bytes = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_end(&mut stdout_bytes)
            .await
            .with_context(|| format!("reading stdout of task '{}'", request.name))?;
    }
    let stdout_text = String::from_utf8_lossy(&stdout_bytes);

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", request.name))?;
    let code = status.code().unwrap_or(-1);

    info!(
        task = %request.name,
        exit_code = code,
        success = status.success(),
        "task process exited"
    );

    if !status.success() {
        warn!(task = %request.name, exit_code = code, "task process failed");
        return Ok(Err(TaskError::failed(format!(
            "`{cmd_line}` exited with code {code}"
        ))));
    }

    Ok(Ok(stdout_to_result(&stdout_text, code)))
}

/// Interpret a command's stdout as a result map.
pub fn stdout_to_result(stdout: &str, exit_code: i32) -> ResultMap {
    let trimmed = stdout.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return map;
    }

    let mut map = ResultMap::new();
    map.insert("stdout".to_string(), Value::String(trimmed.to_string()));
    map.insert("exit_code".to_string(), Value::from(exit_code));
    map
}
