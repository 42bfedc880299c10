//! Two-group dataset permission model: `<project>__<dataset>` for writers and
//! `<project>__<dataset>__read` for readers.
pub mod reconcile;
#[cfg(test)]
mod tests;

pub use reconcile::{PermissionReconciler, ReconcileReport};

use super::{MigrateStep, StepContext, StepError};
use crate::db::Databases;
use crate::hdfs::HopsFsClient;
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
enum Pass {
    Fix,
    Rollback,
}

async fn run(ctx: &StepContext, pass: Pass) -> Result<ReconcileReport> {
    let dbs = Databases::connect(&ctx.config.database).await?;
    let result = async {
        let fs = HopsFsClient::new(dbs.metadata.clone(), &ctx.config.hops)?;
        let reconciler = PermissionReconciler::new(&dbs.hopsworks, &dbs.metadata, &fs, ctx.gate);
        match pass {
            Pass::Fix => reconciler.fix_all().await,
            Pass::Rollback => reconciler.rollback_all().await,
        }
    }
    .await;
    dbs.close().await;
    result
}

pub struct FixDatasetPermission;

#[async_trait::async_trait]
impl MigrateStep for FixDatasetPermission {
    fn name(&self) -> &'static str {
        "dataset.FixDatasetPermission"
    }

    async fn migrate(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, Pass::Fix)
            .await
            .map(|_| ())
            .map_err(|e| StepError::migration(self.name(), e))
    }

    async fn rollback(&self, ctx: &StepContext) -> Result<(), StepError> {
        run(ctx, Pass::Rollback)
            .await
            .map(|_| ())
            .map_err(|e| StepError::rollback(self.name(), e))
    }
}
