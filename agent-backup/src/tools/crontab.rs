//! Line-oriented scheduler store (the user's crontab).

use super::run_tool;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait SchedulerMirror: Send + Sync {
    /// Current scheduler text. An absent table reads as empty.
    async fn read(&self) -> Result<String>;

    /// Replace the scheduler text.
    async fn write(&self, content: &str) -> Result<()>;
}

pub struct CrontabMirror {
    program: String,
    timeout: Duration,
}

impl CrontabMirror {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

/// `crontab -l` exits 1 with "no crontab for <user>" when the user has no table.
/// Any other failure must not be mistaken for an empty table.
fn is_missing_table(status: &str, stderr: &str) -> bool {
    status == "exit code 1" && stderr.to_ascii_lowercase().contains("no crontab for")
}

#[async_trait]
impl SchedulerMirror for CrontabMirror {
    async fn read(&self) -> Result<String> {
        match run_tool(&self.program, &["-l".to_string()], None, self.timeout).await {
            Ok(text) => Ok(text),
            Err(EngineError::ExternalTool { status, stderr, .. }) if is_missing_table(&status, &stderr) => {
                debug!(%stderr, "No crontab yet, treating as empty");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, content: &str) -> Result<()> {
        run_tool(&self.program, &["-".to_string()], Some(content), self.timeout).await?;
        Ok(())
    }
}
