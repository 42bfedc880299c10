use super::acl::acl_spec;
use super::{AclEntry, FsPermission, HdfsGroup, HdfsOps, HdfsUser};
use crate::config::HopsConfig;
use crate::db::dao::HdfsPrincipalDAO;
use anyhow::{Context, Result, anyhow, bail};
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tracing::debug;

/// Filesystem client: permission bits and ACLs go through WebHDFS, users and
/// groups through the namesystem's authorization tables.
pub struct HopsFsClient {
    metadata: DatabaseConnection,
    http: reqwest::Client,
    webhdfs_url: String,
    client_user: String,
}

impl HopsFsClient {
    pub fn new(metadata: DatabaseConnection, cfg: &HopsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build webhdfs http client")?;
        Ok(Self {
            metadata,
            http,
            webhdfs_url: cfg.webhdfs_url.trim_end_matches('/').to_string(),
            client_user: cfg.client_user.clone(),
        })
    }

    async fn webhdfs_put(&self, path: &str, op: &str, params: &[(&str, String)]) -> Result<()> {
        let url = format!("{}{}", self.webhdfs_url, path);
        let mut query: Vec<(&str, String)> = vec![
            ("op", op.to_string()),
            ("user.name", self.client_user.clone()),
        ];
        query.extend(params.iter().cloned());
        debug!(url=%url, op, "webhdfs request");

        let resp = self
            .http
            .put(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("send {op} for {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("{op} on {path} failed with status {status}: {body}");
        }
        Ok(())
    }

    async fn require_user(&self, name: &str) -> Result<HdfsUser> {
        HdfsPrincipalDAO::find_user(&self.metadata, name)
            .await?
            .ok_or_else(|| anyhow!("hdfs user {name} does not exist"))
    }

    async fn require_group(&self, name: &str) -> Result<HdfsGroup> {
        HdfsPrincipalDAO::find_group(&self.metadata, name)
            .await?
            .map(HdfsGroup::from)
            .ok_or_else(|| anyhow!("hdfs group {name} does not exist"))
    }
}

/// Principal changes write the namesystem tables directly. The NameNode keeps
/// its own user and group cache, so it only sees them after that cache is
/// refreshed or the NameNode restarts.
#[async_trait::async_trait]
impl HdfsOps for HopsFsClient {
    async fn find_user(&self, name: &str) -> Result<Option<HdfsUser>> {
        HdfsPrincipalDAO::find_user(&self.metadata, name).await
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<HdfsUser>> {
        HdfsPrincipalDAO::find_user_by_id(&self.metadata, id).await
    }

    async fn find_group(&self, name: &str) -> Result<Option<HdfsGroup>> {
        Ok(HdfsPrincipalDAO::find_group(&self.metadata, name)
            .await?
            .map(HdfsGroup::from))
    }

    async fn group_members(&self, group: &HdfsGroup) -> Result<Vec<HdfsUser>> {
        match group.id {
            Some(id) => HdfsPrincipalDAO::users_in_group(&self.metadata, id).await,
            None => Ok(vec![]),
        }
    }

    async fn add_user(&self, name: &str) -> Result<()> {
        if HdfsPrincipalDAO::find_user(&self.metadata, name).await?.is_none() {
            HdfsPrincipalDAO::insert_user(&self.metadata, name).await?;
        }
        Ok(())
    }

    async fn add_group(&self, name: &str) -> Result<()> {
        if HdfsPrincipalDAO::find_group(&self.metadata, name).await?.is_none() {
            HdfsPrincipalDAO::insert_group(&self.metadata, name).await?;
        }
        Ok(())
    }

    async fn remove_group(&self, name: &str) -> Result<()> {
        if let Some(group) = HdfsPrincipalDAO::find_group(&self.metadata, name).await? {
            HdfsPrincipalDAO::delete_group(&self.metadata, group.id).await?;
        }
        Ok(())
    }

    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<()> {
        let u = self.require_user(user).await?;
        let g = self.require_group(group).await?;
        let group_id = g.id.context("group without id")?;
        HdfsPrincipalDAO::add_membership(&self.metadata, u.id, group_id).await
    }

    async fn remove_user_from_group(&self, user: &str, group: &str) -> Result<()> {
        let u = self.require_user(user).await?;
        let g = self.require_group(group).await?;
        let group_id = g.id.context("group without id")?;
        HdfsPrincipalDAO::remove_membership(&self.metadata, u.id, group_id).await
    }

    async fn set_permission(&self, path: &str, permission: FsPermission) -> Result<()> {
        self.webhdfs_put(path, "SETPERMISSION", &[("permission", permission.to_string())])
            .await
    }

    async fn set_acl(&self, path: &str, entries: &[AclEntry]) -> Result<()> {
        self.webhdfs_put(path, "SETACL", &[("aclspec", acl_spec(entries))])
            .await
    }

    async fn modify_acl_entries(&self, path: &str, entries: &[AclEntry]) -> Result<()> {
        self.webhdfs_put(path, "MODIFYACLENTRIES", &[("aclspec", acl_spec(entries))])
            .await
    }
}
