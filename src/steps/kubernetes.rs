//! One Kubernetes namespace per project.
use super::{MigrateStep, StepContext, StepError};
use crate::clients::KubeClient;
use crate::db::dao::ProjectDAO;
use crate::db::{close_quietly, connect_platform};
use crate::gate::WriteGate;
use crate::naming;
use anyhow::Result;
use sea_orm::DatabaseConnection;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamespaceAction {
    Create,
    Delete,
}

/// Creates or deletes the namespace of every project. A failure for one
/// project is logged and the remaining projects are still processed.
///
/// # Returns
/// * `Result<usize>` - Number of projects whose call failed.
async fn apply_namespaces(
    conn: &DatabaseConnection,
    kube: &KubeClient,
    gate: &WriteGate,
    action: NamespaceAction,
) -> Result<usize> {
    let projects = ProjectDAO::find_all(conn).await?;
    let mut failures = 0;
    for project in projects {
        let namespace = naming::kube_namespace(&project.projectname);
        let result = match action {
            NamespaceAction::Create => {
                gate.run(
                    format!("create namespace {namespace}"),
                    kube.create_namespace(&namespace),
                )
                .await
            }
            NamespaceAction::Delete => {
                gate.run(
                    format!("delete namespace {namespace}"),
                    kube.delete_namespace(&namespace),
                )
                .await
            }
        };
        match result {
            Ok(outcome) => {
                info!(project = %project.projectname, namespace = %namespace, ?outcome, "namespace processed")
            }
            Err(e) => {
                failures += 1;
                error!(project = %project.projectname, namespace = %namespace, error = %e, "namespace call failed");
            }
        }
    }
    Ok(failures)
}

async fn run(ctx: &StepContext, action: NamespaceAction) -> Result<()> {
    let kube = KubeClient::new(&ctx.config.kube)?;
    let conn = connect_platform(&ctx.config.database).await?;
    let result = apply_namespaces(&conn, &kube, &ctx.gate, action).await;
    close_quietly(conn).await;
    result.map(|_| ())
}

pub struct CreateNamespaces;

#[async_trait::async_trait]
impl MigrateStep for CreateNamespaces {
    fn name(&self) -> &'static str {
        "kubernetes.CreateNS"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, NamespaceAction::Create)
            .await
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, NamespaceAction::Delete)
            .await
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
