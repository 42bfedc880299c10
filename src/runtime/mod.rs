//! Process-wide resources shared by the steps of one run.
pub mod executor;

use crate::config::ExecutorConfig;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Hooks get this much longer than the executor grace period.
const HOOK_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub use executor::{ProcessDescriptor, ProcessExecutor};

/// Callback run once when the program finishes.
#[async_trait::async_trait]
pub trait CleanupHook: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32;

    async fn run(&self) -> Result<()>;
}

/// Owns the process executor and the cleanup hooks registered during a run.
pub struct RuntimeContext {
    executor: ProcessExecutor,
    hooks: Mutex<Vec<Box<dyn CleanupHook>>>,
    hook_timeout: Duration,
}

impl RuntimeContext {
    pub fn new(cfg: &ExecutorConfig) -> Self {
        let executor = ProcessExecutor::new(cfg.threads);
        let hooks: Vec<Box<dyn CleanupHook>> = vec![Box::new(ExecutorShutdown {
            executor: executor.clone(),
            grace: cfg.shutdown_timeout,
        })];
        Self {
            executor,
            hooks: Mutex::new(hooks),
            hook_timeout: cfg.shutdown_timeout + HOOK_TIMEOUT_MARGIN,
        }
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }

    #[cfg(test)]
    pub async fn register(&self, hook: Box<dyn CleanupHook>) {
        self.hooks.lock().await.push(hook);
    }

    /// Runs every hook by descending priority. Failures and timeouts are logged.
    pub async fn shutdown(&self) {
        let mut hooks = std::mem::take(&mut *self.hooks.lock().await);
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        for hook in hooks {
            match tokio::time::timeout(self.hook_timeout, hook.run()).await {
                Ok(Ok(())) => info!(hook = hook.name(), "cleanup hook finished"),
                Ok(Err(e)) => error!("Error executing cleanup hook '{}': {}", hook.name(), e),
                Err(_) => error!(
                    "Cleanup hook '{}' timed out after {:?}",
                    hook.name(),
                    self.hook_timeout
                ),
            }
        }
    }
}

/// Lets running processes finish before the program exits.
struct ExecutorShutdown {
    executor: ProcessExecutor,
    grace: Duration,
}

#[async_trait::async_trait]
impl CleanupHook for ExecutorShutdown {
    fn name(&self) -> &str {
        "process-executor"
    }

    fn priority(&self) -> i32 {
        // after every other hook
        i32::MIN
    }

    async fn run(&self) -> Result<()> {
        self.executor.shutdown(self.grace).await
    }
}
