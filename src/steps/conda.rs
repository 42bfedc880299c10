//! Python environment steps: the export for the docker based runtime and the
//! Kibana patterns of the kagent logs they produce.
use super::elk::{KAGENT_PATTERNS, PatternAction, run_kibana};
use super::{MigrateStep, StepContext, StepError};
use crate::config::CondaConfig;
use crate::db::dao::ProjectDAO;
use crate::db::{close_quietly, connect_platform};
use crate::gate::WriteGate;
use crate::naming;
use crate::runtime::{ProcessDescriptor, ProcessExecutor};
use anyhow::Result;
use sea_orm::DatabaseConnection;
use tracing::{error, info};

const EXPORT_SCRIPT: &str = "bin/conda_env_migrate.sh";
/// Exit code of the export script for a project on the default environment.
const DEFAULT_ENV_EXIT_CODE: i32 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub exported: usize,
    pub default_env: usize,
    pub failed: usize,
}

/// Script arguments resolved once per pass.
pub(crate) struct ExportSettings<'a> {
    pub conda: &'a CondaConfig,
    pub client_user: &'a str,
    pub hadoop_home: String,
}

impl ExportSettings<'_> {
    fn descriptor(&self, project: &str, owner: &str) -> ProcessDescriptor {
        ProcessDescriptor::new(
            self.conda
                .expat_path
                .join(EXPORT_SCRIPT)
                .to_string_lossy()
                .into_owned(),
        )
        .arg(project)
        .arg(format!("{}/anaconda", self.conda.dir))
        .arg(self.conda.user.as_str())
        .arg(naming::hdfs_user_name(project, owner))
        .arg(self.client_user)
        .arg(self.hadoop_home.as_str())
        .timeout(self.conda.timeout)
    }
}

/// Runs the export script for every project. A project whose export fails is
/// logged and the next one is processed.
pub(crate) async fn export_environments(
    conn: &DatabaseConnection,
    executor: &ProcessExecutor,
    gate: &WriteGate,
    settings: &ExportSettings<'_>,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();
    for (project, owner) in ProjectDAO::find_all_with_owner(conn).await? {
        let name = project.projectname.as_str();
        let desc = settings.descriptor(name, &owner);
        let result = gate
            .run(
                format!("export python environment of project {name}"),
                executor.execute(&desc),
            )
            .await;
        match result {
            Ok(None) => {}
            Ok(Some(out)) if !out.exited => {
                summary.failed += 1;
                error!(project = name, timeout = ?desc.timeout, "python environment export timed out");
            }
            Ok(Some(out)) => match out.exit_code {
                Some(0) => {
                    summary.exported += 1;
                    info!(project = name, "exported python environment");
                }
                Some(DEFAULT_ENV_EXIT_CODE) => {
                    summary.default_env += 1;
                    info!(project = name, "project uses the default python environment");
                }
                code => {
                    summary.failed += 1;
                    error!(project = name, exit_code = ?code, stderr = %out.stderr.trim(), "failed to export python environment");
                }
            },
            Err(e) => {
                summary.failed += 1;
                error!(project = name, error = %e, "failed to export python environment");
            }
        }
    }
    Ok(summary)
}

/// Exports every project's conda environment. Nothing to undo on rollback.
pub struct DockerConda;

#[async_trait::async_trait]
impl MigrateStep for DockerConda {
    fn name(&self) -> &'static str {
        "conda.DockerConda"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        let run = async {
            let settings = ExportSettings {
                conda: &ctx.config.conda,
                client_user: &ctx.config.hops.client_user,
                hadoop_home: std::env::var("HADOOP_HOME")
                    .unwrap_or_else(|_| ctx.config.conda.hadoop_home.clone()),
            };
            let conn = connect_platform(&ctx.config.database).await?;
            let result =
                export_environments(&conn, ctx.runtime.executor(), &ctx.gate, &settings).await;
            close_quietly(conn).await;
            let summary = result?;
            info!(
                exported = summary.exported,
                default_env = summary.default_env,
                failed = summary.failed,
                "python environment export finished"
            );
            Ok(())
        };
        run.await.map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, _ctx: &StepContext) -> Result<(), StepError> {
        info!(step = self.name(), "nothing to roll back");
        Ok(())
    }
}

/// `<project>_kagent-*` index patterns for projects with a conda environment.
pub struct CreateKagentLogsIndexPatterns;

#[async_trait::async_trait]
impl MigrateStep for CreateKagentLogsIndexPatterns {
    fn name(&self) -> &'static str {
        "conda.CreateKagentLogsIndeces"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &KAGENT_PATTERNS, PatternAction::Create)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &KAGENT_PATTERNS, PatternAction::Delete)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
