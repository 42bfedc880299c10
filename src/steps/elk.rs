//! Elasticsearch and Kibana steps.
use super::{MigrateStep, StepContext, StepError};
use crate::clients::{ElasticClient, HopsworksClient, KibanaClient};
use crate::db::dao::ProjectDAO;
use crate::db::{close_quietly, connect_platform};
use crate::gate::WriteGate;
use crate::naming;
use anyhow::Result;
use sea_orm::DatabaseConnection;
use tracing::{debug, error, info};

pub const APP_PROVENANCE_OLD_INDEX: &str = "app_prov";
pub const APP_PROVENANCE_NEW_INDEX: &str = "app_provenance";

/// Suffixes of the per-project index patterns, appended to the lowercased project name.
pub const KIBANA_PATTERN_SUFFIXES: [&str; 5] = [
    "_logs-*",
    "_kagent-*",
    "_serving-*",
    "_beamjobserver-*",
    "_beamsdkworker-*",
];

/// Which index patterns a Kibana step manages, and for which projects.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatternSet {
    pub suffixes: &'static [&'static str],
    /// Only projects with a conda environment.
    pub conda_only: bool,
    /// Calls carry a per-project token from the platform API. Without it
    /// Kibana is called unauthenticated.
    pub secured: bool,
}

pub(crate) const MULTI_TENANT_PATTERNS: PatternSet = PatternSet {
    suffixes: &KIBANA_PATTERN_SUFFIXES,
    conda_only: false,
    secured: true,
};

pub(crate) const BEAM_PATTERNS: PatternSet = PatternSet {
    suffixes: &["_beamjobserver-*", "_beamsdkworker-*"],
    conda_only: false,
    secured: false,
};

pub(crate) const KAGENT_PATTERNS: PatternSet = PatternSet {
    suffixes: &["_kagent-*"],
    conda_only: true,
    secured: false,
};

/// Copies `from` into `to` when both indices exist and reports item counts.
///
/// # Returns
/// * `Result<bool>` - `false` when an index was missing and nothing ran.
async fn reindex_between(
    elastic: &ElasticClient,
    gate: &WriteGate,
    from: &str,
    to: &str,
) -> Result<bool> {
    if !elastic.index_exists(from).await? {
        info!(index = from, "source index missing, nothing to reindex");
        return Ok(false);
    }
    if !elastic.index_exists(to).await? {
        info!(index = to, "destination index missing, nothing to reindex");
        return Ok(false);
    }
    let initial = elastic.item_count(to).await?;
    let reindexed = gate
        .run(
            format!("reindex {from} into {to}"),
            elastic.reindex(from, to),
        )
        .await?;
    if reindexed.is_none() {
        return Ok(true);
    }
    let from_count = elastic.item_count(from).await?;
    let to_count = elastic.item_count(to).await?;
    if from_count != to_count {
        info!(
            from,
            to,
            from_count,
            initial_count = initial,
            to_count,
            "reindexed with item count mismatch"
        );
    }
    info!(from, to, "reindexed");
    Ok(true)
}

/// Moves application provenance from `app_prov` to `app_provenance`.
pub struct AppProvenanceReindex;

#[async_trait::async_trait]
impl MigrateStep for AppProvenanceReindex {
    fn name(&self) -> &'static str {
        "appprovenance.ReindexV1"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        let run = async {
            let elastic = ElasticClient::new(&ctx.config.elastic)?;
            reindex_between(
                &elastic,
                &ctx.gate,
                APP_PROVENANCE_OLD_INDEX,
                APP_PROVENANCE_NEW_INDEX,
            )
            .await
        };
        run.await
            .map(|_| ())
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        let run = async {
            let elastic = ElasticClient::new(&ctx.config.elastic)?;
            reindex_between(
                &elastic,
                &ctx.gate,
                APP_PROVENANCE_NEW_INDEX,
                APP_PROVENANCE_OLD_INDEX,
            )
            .await
        };
        run.await
            .map(|_| ())
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternAction {
    Create,
    Delete,
}

/// Creates or deletes the index patterns of `set` for every matching project.
/// Projects are tokened through `hopsworks` when one is given.
///
/// A token that cannot be fetched aborts the pass. A failed pattern call is
/// logged and the next pattern is tried.
///
/// # Returns
/// * `Result<usize>` - Number of pattern calls that failed.
async fn apply_index_patterns(
    conn: &DatabaseConnection,
    hopsworks: Option<&HopsworksClient>,
    kibana: &KibanaClient,
    gate: &WriteGate,
    set: &PatternSet,
    action: PatternAction,
) -> Result<usize> {
    let projects = if set.conda_only {
        ProjectDAO::find_with_conda(conn).await?
    } else {
        ProjectDAO::find_all(conn).await?
    };
    let mut failures = 0;
    for project in projects {
        if project.projectname.is_empty() {
            continue;
        }
        debug!(project_id = project.id, project = %project.projectname, "found project");
        let token = match hopsworks {
            Some(hopsworks) => Some(hopsworks.elk_token(project.id).await?),
            None => None,
        };
        for suffix in set.suffixes {
            let title = naming::kibana_index_pattern(&project.projectname, suffix);
            let result = match action {
                PatternAction::Create => {
                    gate.run(
                        format!("create index pattern {title}"),
                        kibana.create_index_pattern(token.as_deref(), &title),
                    )
                    .await
                }
                PatternAction::Delete => {
                    gate.run(
                        format!("delete index pattern {title}"),
                        kibana.delete_index_pattern(token.as_deref(), &title),
                    )
                    .await
                }
            };
            if let Err(e) = result {
                failures += 1;
                error!(project = %project.projectname, title = %title, error = %e, "index pattern call failed, moving on");
            }
        }
    }
    Ok(failures)
}

pub(crate) async fn run_kibana(
    ctx: &StepContext,
    set: &PatternSet,
    action: PatternAction,
) -> Result<()> {
    let verify = ctx.config.elastic.verify_certificates;
    let kibana = KibanaClient::new(&ctx.config.kibana, verify)?;
    let hopsworks = if set.secured {
        Some(HopsworksClient::new(&ctx.config.hopsworks, verify)?)
    } else {
        None
    };
    let conn = connect_platform(&ctx.config.database).await?;
    let result =
        apply_index_patterns(&conn, hopsworks.as_ref(), &kibana, &ctx.gate, set, action).await;
    close_quietly(conn).await;
    result.map(|_| ())
}

/// Per-project Kibana index patterns for the multi-tenant setup.
pub struct MultiTenantKibana;

#[async_trait::async_trait]
impl MigrateStep for MultiTenantKibana {
    fn name(&self) -> &'static str {
        "elk.MultiTenantKibana"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &MULTI_TENANT_PATTERNS, PatternAction::Create)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &MULTI_TENANT_PATTERNS, PatternAction::Delete)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}

/// Beam job server and SDK worker index patterns on an unsecured Kibana.
pub struct BeamKibana;

#[async_trait::async_trait]
impl MigrateStep for BeamKibana {
    fn name(&self) -> &'static str {
        "elk.BeamKibana"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &BEAM_PATTERNS, PatternAction::Create)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run_kibana(ctx, &BEAM_PATTERNS, PatternAction::Delete)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
