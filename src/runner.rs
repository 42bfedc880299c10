//! Resolves the steps configured for a target version and runs them in order.
use crate::steps::{StepContext, StepKind};
use anyhow::Result;
use clap::ValueEnum;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Migrate,
    Rollback,
}

#[derive(Error, Debug, PartialEq)]
pub enum RunnerError {
    #[error("invalid target version {0:?}, expected <major>.<minor>[.<patch>][-SNAPSHOT]")]
    InvalidVersion(String),
    #[error("no migration steps configured for {0}")]
    NoSteps(String),
    #[error("unknown migration step: {0}")]
    UnknownStep(String),
}

/// Maps a target version to its `[versions]` key.
///
/// `-SNAPSHOT` is stripped, the last component dropped and the remaining dots
/// removed: `1.4.0-SNAPSHOT` becomes `version-14`.
pub fn version_key(version: &str) -> Result<String, RunnerError> {
    let trimmed = version.trim();
    let release = trimmed.strip_suffix("-SNAPSHOT").unwrap_or(trimmed);
    let invalid = || RunnerError::InvalidVersion(version.to_string());
    let (major_minor, _) = release.rsplit_once('.').ok_or_else(invalid)?;
    let digits = major_minor.replace('.', "");
    if digits.is_empty() {
        return Err(invalid());
    }
    Ok(format!("version-{digits}"))
}

/// Resolves every identifier before anything runs, so an unknown one has no side effects.
pub fn resolve(ids: &[String]) -> Result<Vec<StepKind>, RunnerError> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| StepKind::from_id(id).ok_or_else(|| RunnerError::UnknownStep(id.to_string())))
        .collect()
}

/// Runs the steps of `target_version` sequentially. The first failing step
/// aborts the remaining ones.
pub async fn run(ctx: &StepContext, action: Action, target_version: &str) -> Result<()> {
    let key = version_key(target_version)?;
    let ids = ctx
        .config
        .steps_for(&key)
        .ok_or_else(|| RunnerError::NoSteps(key.clone()))?;
    let kinds = resolve(ids)?;
    info!(
        version = %key,
        ?action,
        steps = kinds.len(),
        dry_run = ctx.gate.is_dry_run(),
        "starting"
    );
    for kind in kinds {
        let step = kind.create();
        info!(step = step.name(), ?action, "running step");
        match action {
            Action::Migrate => step.migrate(ctx).await?,
            Action::Rollback => step.rollback(ctx).await?,
        }
        info!(step = step.name(), ?action, "step finished");
    }
    info!(version = %key, ?action, "done");
    Ok(())
}
