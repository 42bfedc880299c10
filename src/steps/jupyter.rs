//! Rewrite of `jupyter_settings.docker_config`.
use super::{MigrateStep, StepContext, StepError, rewrite_rows};
use crate::db::dao::JupyterSettingsDAO;
use crate::db::{close_quietly, connect_platform};
use crate::gate::WriteGate;
use crate::json_mapping::{Direction, FieldMapping, FieldRule};
use anyhow::Result;
use sea_orm::DatabaseConnection;
use tracing::info;

/// Flat `memory`/`cores`/`gpus` move under a typed `resourceConfig` object.
pub fn docker_resources_mapping() -> FieldMapping {
    FieldMapping::new(vec![
        FieldRule::constant("resourceConfig/type", "dockerResourcesConfiguration"),
        FieldRule::moved("memory", "resourceConfig/memory").with_default(1024),
        FieldRule::moved("cores", "resourceConfig/cores").with_default(1),
        FieldRule::moved("gpus", "resourceConfig/gpus").with_default(0),
    ])
}

pub(crate) async fn rewrite_docker_configs(
    conn: &DatabaseConnection,
    gate: &WriteGate,
    direction: Direction,
) -> Result<usize> {
    let settings = JupyterSettingsDAO::find_all(conn).await?;
    let total = settings.len();
    // users that never started a docker server have no configuration
    let rows = settings
        .into_iter()
        .filter_map(|s| {
            s.docker_config
                .map(|config| ((s.project_id, s.team_member), config))
        })
        .collect();
    let updates = rewrite_rows(rows, &docker_resources_mapping(), direction);
    info!(total, changed = updates.len(), ?direction, "jupyter docker configurations rewritten");
    if updates.is_empty() {
        return Ok(0);
    }
    gate.run(
        format!("update {} jupyter docker configurations", updates.len()),
        JupyterSettingsDAO::update_docker_configs(conn, &updates),
    )
    .await?;
    Ok(updates.len())
}

async fn run(ctx: &StepContext, direction: Direction) -> Result<()> {
    let conn = connect_platform(&ctx.config.database).await?;
    let result = rewrite_docker_configs(&conn, &ctx.gate, direction).await;
    close_quietly(conn).await;
    result.map(|_| ())
}

pub struct JupyterDockerResourcesMigration;

#[async_trait::async_trait]
impl MigrateStep for JupyterDockerResourcesMigration {
    fn name(&self) -> &'static str {
        "docker.JupyterDockerResourcesMigration"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, Direction::Forward)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, Direction::Reverse)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
