//! Single point every mutating call passes through.
//!
//! In dry-run mode the write is described in the log and its future is dropped without being polled.

use anyhow::Result;
use std::fmt::Display;
use std::future::Future;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct WriteGate {
    dry_run: bool,
}

impl WriteGate {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs `write` unless dry-run is on.
    ///
    /// # Arguments
    /// * `action` - Human readable description, logged in both modes.
    /// * `write` - The mutation. Not polled in dry-run.
    ///
    /// # Returns
    /// * `Result<Option<T>>` - `Some` with the write's output, `None` in dry-run.
    pub async fn run<T, F>(&self, action: impl Display, write: F) -> Result<Option<T>>
    where
        F: Future<Output = Result<T>>,
    {
        if self.dry_run {
            info!(dry_run = true, "{action}");
            return Ok(None);
        }
        let out = write.await?;
        info!("{action}");
        Ok(Some(out))
    }
}
