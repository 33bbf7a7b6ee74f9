//! External collaborators invoked as child processes.
//!
//! Each collaborator sits behind a narrow trait (`Archiver`, `SchedulerMirror`,
//! `ServiceManager`) with one process-backed implementation here and a fake in
//! the test harness.

pub mod archive;
pub mod crontab;
pub mod service;

pub use archive::{Archiver, TarArchiver};
pub use crontab::{CrontabMirror, SchedulerMirror};
pub use service::{ServiceManager, SystemdGateway};

use crate::utils::errors::{EngineError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Run `program` with `args`, optionally feeding `input` on stdin, and return stdout.
///
/// A non-zero exit maps to `ExternalTool` carrying the exit status and stderr.
/// Exceeding `timeout` kills the child and maps to `Timeout`.
pub async fn run_tool(
    program: &str,
    args: &[String],
    input: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    debug!(tool = %program, ?args, "Running external tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| EngineError::tool_failure(program, "spawn", e.to_string()))?;

    // The stdin write counts against the timeout: a child that never reads
    // would otherwise block us once the pipe buffer fills.
    let exchange = async move {
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(timeout, exchange).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(EngineError::Timeout {
                tool: program.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(EngineError::tool_failure(program, status, stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_tool_returns_stdout() {
        let out = run_tool("sh", &args(&["-c", "echo hello"]), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_tool_feeds_stdin() {
        let out = run_tool("cat", &[], Some("line one\nline two\n"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "line one\nline two\n");
    }

    #[tokio::test]
    async fn test_run_tool_nonzero_exit() {
        let err = run_tool("sh", &args(&["-c", "echo broken >&2; exit 3"]), None, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            EngineError::ExternalTool { status, stderr, .. } => {
                assert_eq!(status, "exit code 3");
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_tool_timeout_is_distinct() {
        let err = run_tool("sleep", &args(&["5"]), None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_tool_timeout_covers_stdin_write() {
        // Far more than a pipe buffer, to a child that never reads it.
        let input = "x".repeat(1 << 20);
        let started = std::time::Instant::now();
        let err = run_tool("sleep", &args(&["5"]), Some(&input), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }), "unexpected error: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let err = run_tool("definitely-not-a-real-tool-xyz", &[], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ExternalTool { .. }));
    }
}
