//! Migration steps and the compile-time registry that names them.
pub mod conda;
pub mod dataset;
pub mod elk;
pub mod jobs;
pub mod jupyter;
pub mod kubernetes;

use crate::config::ExpatConfig;
use crate::gate::WriteGate;
use crate::json_mapping::{Direction, JsonRewrite};
use crate::runtime::RuntimeContext;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Prefix of identifiers written by older configuration files.
pub const LEGACY_PREFIX: &str = "io.hops.hopsworks.expat.migrations.";

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("{step}: migration failed: {message}")]
    Migration {
        step: &'static str,
        message: String,
        #[source]
        source: BoxedSource,
    },
    #[error("{step}: rollback failed: {message}")]
    Rollback {
        step: &'static str,
        message: String,
        #[source]
        source: BoxedSource,
    },
}

impl StepError {
    pub fn migration(step: &'static str, err: anyhow::Error) -> Self {
        StepError::Migration {
            step,
            message: format!("{err:#}"),
            source: err.into(),
        }
    }

    pub fn rollback(step: &'static str, err: anyhow::Error) -> Self {
        StepError::Rollback {
            step,
            message: format!("{err:#}"),
            source: err.into(),
        }
    }

    pub fn step(&self) -> &'static str {
        match self {
            StepError::Migration { step, .. } | StepError::Rollback { step, .. } => step,
        }
    }
}

/// Shared state handed to every step.
#[derive(Clone)]
pub struct StepContext {
    pub config: Arc<ExpatConfig>,
    pub gate: WriteGate,
    pub runtime: Arc<RuntimeContext>,
}

impl StepContext {
    pub fn new(config: Arc<ExpatConfig>, runtime: Arc<RuntimeContext>) -> Self {
        let gate = WriteGate::new(config.dry_run);
        Self {
            config,
            gate,
            runtime,
        }
    }
}

/// One versioned, reversible change to an installation.
#[async_trait::async_trait]
pub trait MigrateStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError>;
    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    FixDatasetPermission,
    JobsGpu,
    JobsDockerCommandArgs,
    JobsRenameResources,
    JobsArgsToExecutions,
    JupyterDockerResources,
    CreateNamespaces,
    AppProvenanceReindex,
    MultiTenantKibana,
    BeamKibana,
    DockerConda,
    KagentLogsIndexPatterns,
}

impl StepKind {
    pub const ALL: [StepKind; 12] = [
        StepKind::FixDatasetPermission,
        StepKind::JobsGpu,
        StepKind::JobsDockerCommandArgs,
        StepKind::JobsRenameResources,
        StepKind::JobsArgsToExecutions,
        StepKind::JupyterDockerResources,
        StepKind::CreateNamespaces,
        StepKind::AppProvenanceReindex,
        StepKind::MultiTenantKibana,
        StepKind::BeamKibana,
        StepKind::DockerConda,
        StepKind::KagentLogsIndexPatterns,
    ];

    /// Short identifier used in the `[versions]` table.
    pub fn id(self) -> &'static str {
        match self {
            StepKind::FixDatasetPermission => "dataset.FixDatasetPermission",
            StepKind::JobsGpu => "jobs.JobsGpuMigration",
            StepKind::JobsDockerCommandArgs => "docker.JobsDockerCommandArgsMigration",
            StepKind::JobsRenameResources => "jobs.RenameResources",
            StepKind::JobsArgsToExecutions => "jobs.UpdateJobArgsConfiguration",
            StepKind::JupyterDockerResources => "docker.JupyterDockerResourcesMigration",
            StepKind::CreateNamespaces => "kubernetes.CreateNS",
            StepKind::AppProvenanceReindex => "appprovenance.ReindexV1",
            StepKind::MultiTenantKibana => "elk.MultiTenantKibana",
            StepKind::BeamKibana => "elk.BeamKibana",
            StepKind::DockerConda => "conda.DockerConda",
            StepKind::KagentLogsIndexPatterns => "conda.CreateKagentLogsIndeces",
        }
    }

    /// Resolves a short or legacy fully-qualified identifier.
    pub fn from_id(id: &str) -> Option<StepKind> {
        let id = id.trim();
        let short = id.strip_prefix(LEGACY_PREFIX).unwrap_or(id);
        Self::ALL.into_iter().find(|k| k.id() == short)
    }

    pub fn create(self) -> Box<dyn MigrateStep> {
        match self {
            StepKind::FixDatasetPermission => Box::new(dataset::FixDatasetPermission),
            StepKind::JobsGpu => Box::new(jobs::JobsGpuMigration),
            StepKind::JobsDockerCommandArgs => Box::new(jobs::JobsDockerCommandArgsMigration),
            StepKind::JobsRenameResources => Box::new(jobs::RenameResources),
            StepKind::JobsArgsToExecutions => Box::new(jobs::JobArgsToExecutions),
            StepKind::JupyterDockerResources => {
                Box::new(jupyter::JupyterDockerResourcesMigration)
            }
            StepKind::CreateNamespaces => Box::new(kubernetes::CreateNamespaces),
            StepKind::AppProvenanceReindex => Box::new(elk::AppProvenanceReindex),
            StepKind::MultiTenantKibana => Box::new(elk::MultiTenantKibana),
            StepKind::BeamKibana => Box::new(elk::BeamKibana),
            StepKind::DockerConda => Box::new(conda::DockerConda),
            StepKind::KagentLogsIndexPatterns => Box::new(conda::CreateKagentLogsIndexPatterns),
        }
    }
}

/// Rewrites every `(key, json)` row with `rewrite`.
///
/// Rows that do not change are left out. A row that is not a JSON object is
/// logged and skipped.
pub(crate) fn rewrite_rows<K: std::fmt::Debug>(
    rows: Vec<(K, String)>,
    rewrite: &impl JsonRewrite,
    direction: Direction,
) -> Vec<(K, String)> {
    rows.into_iter()
        .filter_map(|(key, text)| match rewrite.rewrite_str(&text, direction) {
            Ok(Some(updated)) => Some((key, updated)),
            Ok(None) => None,
            Err(e) => {
                warn!(row = ?key, error = %e, "skipping unreadable configuration");
                None
            }
        })
        .collect()
}
