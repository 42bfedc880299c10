use anyhow::{Context, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An external command to run.
#[derive(Debug, Clone)]
pub struct ProcessDescriptor {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ProcessDescriptor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub exited: bool,
}

/// Bounded pool for external processes. Cloning shares the pool.
#[derive(Clone)]
pub struct ProcessExecutor {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ProcessExecutor {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Runs a process, killing it when its timeout elapses.
    ///
    /// # Arguments
    /// * `desc` - Command, arguments and timeout.
    ///
    /// # Returns
    /// * `Result<ProcessResult>` - Captured output. A timeout is not an error; the
    ///   result then has `exited == false`.
    pub async fn execute(&self, desc: &ProcessDescriptor) -> Result<ProcessResult> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("process executor is shut down")?;

        let mut cmd = Command::new(&desc.program);
        cmd.args(&desc.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(program=%desc.program, args=?desc.args, "spawning process");
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute command: {}", desc.program))?;

        match tokio::time::timeout(desc.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output =
                    output.with_context(|| format!("Failed to wait for {}", desc.program))?;
                Ok(ProcessResult {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exited: true,
                })
            }
            // dropping the future drops the child, which kills it
            Err(_) => {
                warn!(program=%desc.program, timeout=?desc.timeout, "process timed out");
                Ok(ProcessResult {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: "Process timed-out".to_string(),
                    exited: false,
                })
            }
        }
    }

    /// Waits for running processes to finish, then refuses new ones.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        let n = u32::try_from(self.size).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(grace, self.permits.acquire_many(n)).await;
        self.permits.close();
        match drained {
            Ok(Ok(permits)) => {
                permits.forget();
                Ok(())
            }
            Ok(Err(_)) => Ok(()),
            Err(_) => anyhow::bail!("processes still running after {grace:?}"),
        }
    }
}
