//! Rewrites of `jobs.json_config`.
use super::{MigrateStep, StepContext, StepError, rewrite_rows};
use crate::db::dao::{ExecutionDAO, JobArgsUpdate, JobDAO};
use crate::db::{close_quietly, connect_platform};
use crate::gate::WriteGate;
use crate::json_mapping::{Direction, FieldMapping, FieldRule, JsonRewrite, MappingError};
use anyhow::Result;
use sea_orm::DatabaseConnection;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const DOCKER_JOB_TYPE: &str = "DOCKER";
/// `jobType` values whose `args` live on the latest execution.
const ARGS_JOB_TYPES: [&str; 2] = ["SPARK", "PYSPARK"];

const LOCAL_RESOURCES: &str = "localResources";
const DIST_JARS: &str = "spark.yarn.dist.jars";
const DIST_FILES: &str = "spark.yarn.dist.files";
const DIST_ARCHIVES: &str = "spark.yarn.dist.archives";
const DIST_PY_FILES: &str = "spark.yarn.dist.pyFiles";

/// Every job gets `NUM_GPUS = "0"`.
pub fn gpu_mapping() -> FieldMapping {
    FieldMapping::new(vec![FieldRule::constant("NUM_GPUS", "0")])
}

/// Docker jobs: `args` becomes `defaultArgs` and `command` becomes a list.
pub fn docker_command_mapping() -> FieldMapping {
    FieldMapping::new(vec![
        FieldRule::moved("args", "defaultArgs"),
        FieldRule::moved("command", "command").as_list(),
    ])
}

/// Spark `localResources` entries become the comma separated
/// `spark.yarn.dist.*` lists, and the obsolete `kafka` block is dropped.
///
/// Each list keeps a trailing comma after every path. Reversing rebuilds
/// `localResources` only from a document that has at least one list, so a
/// job that was never migrated keeps its resources.
pub struct ResourceLists;

impl JsonRewrite for ResourceLists {
    fn rewrite(&self, doc: &mut Value, direction: Direction) -> Result<bool> {
        let root = doc.as_object_mut().ok_or(MappingError::NotAnObject)?;
        let before = root.clone();
        match direction {
            Direction::Forward => split_resources(root),
            Direction::Reverse => join_resources(root),
        }
        Ok(*root != before)
    }
}

fn split_resources(root: &mut Map<String, Value>) {
    root.remove("kafka");
    let Some(resources) = root.remove(LOCAL_RESOURCES) else {
        return;
    };
    let mut lists: HashMap<&str, String> = [DIST_JARS, DIST_PY_FILES, DIST_ARCHIVES, DIST_FILES]
        .into_iter()
        .map(|key| (key, String::new()))
        .collect();
    for resource in resources.as_array().into_iter().flatten() {
        let kind = resource.get("type").and_then(Value::as_str);
        let path = resource.get("path").and_then(Value::as_str);
        let (Some(kind), Some(path)) = (kind, path) else {
            continue;
        };
        let key = if path.ends_with(".jar") {
            DIST_JARS
        } else if path.ends_with(".py") {
            DIST_PY_FILES
        } else if kind.eq_ignore_ascii_case("archive") {
            DIST_ARCHIVES
        } else if kind.eq_ignore_ascii_case("file") {
            DIST_FILES
        } else {
            continue;
        };
        if let Some(list) = lists.get_mut(key) {
            list.push_str(path);
            list.push(',');
        }
    }
    for (key, list) in lists {
        root.insert(key.to_string(), Value::String(list));
    }
}

fn join_resources(root: &mut Map<String, Value>) {
    let mut resources = Vec::new();
    let mut found = false;
    for (key, kind) in [
        (DIST_JARS, "file"),
        (DIST_FILES, "file"),
        (DIST_ARCHIVES, "archive"),
        (DIST_PY_FILES, "file"),
    ] {
        let Some(list) = root.remove(key) else {
            continue;
        };
        found = true;
        let paths = list.as_str().unwrap_or_default();
        for path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let name = path.rsplit('/').next().unwrap_or(path);
            resources.push(json!({
                "name": name,
                "path": path,
                "visibility": "application",
                "type": kind,
            }));
        }
    }
    if found {
        root.insert(LOCAL_RESOURCES.to_string(), Value::Array(resources));
    }
}

/// Applies `rewrite` to the jobs of `job_type` (all jobs when `None`) and
/// writes the changed rows back in one transaction.
///
/// # Returns
/// * `Result<usize>` - Number of rows that changed (or would change in dry-run).
pub(crate) async fn rewrite_job_configs(
    conn: &DatabaseConnection,
    gate: &WriteGate,
    job_type: Option<&str>,
    rewrite: &impl JsonRewrite,
    direction: Direction,
) -> Result<usize> {
    let jobs = match job_type {
        Some(t) => JobDAO::find_by_type(conn, t).await?,
        None => JobDAO::find_all(conn).await?,
    };
    let total = jobs.len();
    let rows = jobs.into_iter().map(|j| (j.id, j.json_config)).collect();
    let updates = rewrite_rows(rows, rewrite, direction);
    info!(total, changed = updates.len(), ?direction, "job configurations rewritten");
    if updates.is_empty() {
        return Ok(0);
    }
    gate.run(
        format!("update {} job configurations", updates.len()),
        JobDAO::update_configs(conn, &updates),
    )
    .await?;
    Ok(updates.len())
}

/// Moves `args` of Spark jobs onto their latest execution, or back onto the
/// job on rollback.
///
/// A job that never ran keeps its `args`. Rollback restores the latest
/// execution's `args` when it has any.
///
/// # Returns
/// * `Result<usize>` - Number of jobs that changed (or would change in dry-run).
pub(crate) async fn move_job_args(
    conn: &DatabaseConnection,
    gate: &WriteGate,
    direction: Direction,
) -> Result<usize> {
    let jobs = JobDAO::find_all(conn).await?;
    let latest = ExecutionDAO::latest_by_job(conn).await?;
    let total = jobs.len();
    let mut updates = Vec::new();
    for job in jobs {
        let mut doc: Value = match serde_json::from_str(&job.json_config) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(job = job.id, error = %e, "skipping unreadable configuration");
                continue;
            }
        };
        let Some(root) = doc.as_object_mut() else {
            warn!(job = job.id, "skipping configuration that is not an object");
            continue;
        };
        let job_type = root.get("jobType").and_then(Value::as_str);
        if !job_type.is_some_and(|t| ARGS_JOB_TYPES.contains(&t)) {
            continue;
        }
        let Some(execution) = latest.get(&job.id) else {
            debug!(job = job.id, "job never ran, args stay on the job");
            continue;
        };
        let execution_args = match direction {
            Direction::Forward => {
                let Some(args) = root.remove("args") else {
                    continue;
                };
                let args = match args {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((execution.id, args))
            }
            Direction::Reverse => {
                let Some(args) = execution.args.as_deref() else {
                    continue;
                };
                if root.get("args").and_then(Value::as_str) == Some(args) {
                    continue;
                }
                root.insert("args".to_string(), Value::String(args.to_string()));
                None
            }
        };
        updates.push(JobArgsUpdate {
            job_id: job.id,
            json_config: serde_json::to_string(&doc)?,
            execution_args,
        });
    }
    info!(total, changed = updates.len(), ?direction, "job arguments moved");
    if updates.is_empty() {
        return Ok(0);
    }
    gate.run(
        format!("update {} jobs and their latest executions", updates.len()),
        JobDAO::update_configs_with_args(conn, &updates),
    )
    .await?;
    Ok(updates.len())
}

async fn run(
    ctx: &StepContext,
    job_type: Option<&str>,
    rewrite: impl JsonRewrite,
    direction: Direction,
) -> Result<()> {
    let conn = connect_platform(&ctx.config.database).await?;
    let result = rewrite_job_configs(&conn, &ctx.gate, job_type, &rewrite, direction).await;
    close_quietly(conn).await;
    result.map(|_| ())
}

pub struct JobsGpuMigration;

#[async_trait::async_trait]
impl MigrateStep for JobsGpuMigration {
    fn name(&self) -> &'static str {
        "jobs.JobsGpuMigration"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, None, gpu_mapping(), Direction::Forward)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, None, gpu_mapping(), Direction::Reverse)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}

pub struct JobsDockerCommandArgsMigration;

#[async_trait::async_trait]
impl MigrateStep for JobsDockerCommandArgsMigration {
    fn name(&self) -> &'static str {
        "docker.JobsDockerCommandArgsMigration"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(
            ctx,
            Some(DOCKER_JOB_TYPE),
            docker_command_mapping(),
            Direction::Forward,
        )
        .await
        .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(
            ctx,
            Some(DOCKER_JOB_TYPE),
            docker_command_mapping(),
            Direction::Reverse,
        )
        .await
        .map_err(|e| StepError::rollback(self.name(), e))
    }
}

pub struct RenameResources;

#[async_trait::async_trait]
impl MigrateStep for RenameResources {
    fn name(&self) -> &'static str {
        "jobs.RenameResources"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, None, ResourceLists, Direction::Forward)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, None, ResourceLists, Direction::Reverse)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}

pub struct JobArgsToExecutions;

impl JobArgsToExecutions {
    async fn run(ctx: &StepContext, direction: Direction) -> Result<()> {
        let conn = connect_platform(&ctx.config.database).await?;
        let result = move_job_args(&conn, &ctx.gate, direction).await;
        close_quietly(conn).await;
        result.map(|_| ())
    }
}

#[async_trait::async_trait]
impl MigrateStep for JobArgsToExecutions {
    fn name(&self) -> &'static str {
        "jobs.UpdateJobArgsConfiguration"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        Self::run(ctx, Direction::Forward)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        Self::run(ctx, Direction::Reverse)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
