use crate::db::dao::{
    DatasetDAO, DatasetSharedWithDAO, InodeDAO, ProjectDAO, ProjectMember, ProjectMemberDAO,
};
use crate::db::entities::{dataset, hdfs_inode, project};
use crate::db::{DatasetPermission, ProjectRole};
use crate::gate::WriteGate;
use crate::hdfs::acl::{acl_spec, dataset_acl, immutable_acl, mutable_acl};
use crate::hdfs::{FsPermission, HdfsGroup, HdfsOps};
use crate::naming;
use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, PartialEq)]
pub enum PermissionError {
    #[error("illegal state: {0}")]
    IllegalState(String),
}

/// Which of the two dataset groups a member belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    Read,
}

pub fn desired_access(permission: DatasetPermission, role: &ProjectRole) -> Access {
    match permission {
        DatasetPermission::Editable => Access::ReadWrite,
        DatasetPermission::ReadOnly => Access::Read,
        DatasetPermission::EditableByOwners if *role == ProjectRole::DataOwner => Access::ReadWrite,
        DatasetPermission::EditableByOwners => Access::Read,
    }
}

/// Counters of one pass, logged when it finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub projects: usize,
    pub skipped_projects: usize,
    pub datasets: usize,
}

/// The two groups of a dataset.
struct DatasetGroups {
    rw: HdfsGroup,
    read: HdfsGroup,
}

/// Location and ownership of a dataset on the filesystem.
struct DatasetLocation {
    inode: hdfs_inode::Model,
    path: String,
    owner: Option<String>,
}

/// Brings filesystem group membership and ACLs of every dataset in line with
/// the permissions stored in the platform database.
pub struct PermissionReconciler<'a> {
    hopsworks: &'a DatabaseConnection,
    metadata: &'a DatabaseConnection,
    fs: &'a dyn HdfsOps,
    gate: WriteGate,
}

impl<'a> PermissionReconciler<'a> {
    pub fn new(
        hopsworks: &'a DatabaseConnection,
        metadata: &'a DatabaseConnection,
        fs: &'a dyn HdfsOps,
        gate: WriteGate,
    ) -> Self {
        Self {
            hopsworks,
            metadata,
            fs,
            gate,
        }
    }

    /// Reconciles every project. The first failing project aborts the pass.
    pub async fn fix_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let projects = ProjectDAO::find_all(self.hopsworks).await?;
        for project in &projects {
            info!(project = %project.projectname, "fixing dataset permissions");
            self.fix_project(project, &mut report)
                .await
                .with_context(|| format!("fix permissions of project {}", project.projectname))?;
        }
        info!(
            projects = report.projects,
            skipped = report.skipped_projects,
            datasets = report.datasets,
            "fixed dataset permissions"
        );
        Ok(report)
    }

    /// Restores the single-group model on every project.
    pub async fn rollback_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let projects = ProjectDAO::find_all(self.hopsworks).await?;
        for project in &projects {
            info!(project = %project.projectname, "rolling back dataset permissions");
            self.rollback_project(project, &mut report)
                .await
                .with_context(|| {
                    format!("roll back permissions of project {}", project.projectname)
                })?;
        }
        info!(
            projects = report.projects,
            skipped = report.skipped_projects,
            datasets = report.datasets,
            "rolled back dataset permissions"
        );
        Ok(report)
    }

    async fn project_members(&self, project_id: i32) -> Result<Vec<ProjectMember>> {
        ProjectMemberDAO::find_by_project(self.hopsworks, project_id).await
    }

    async fn is_under_removal(&self, project: &project::Model) -> Result<bool> {
        let members = self.project_members(project.id).await?;
        Ok(members.iter().any(|m| m.role == ProjectRole::UnderRemoval))
    }

    async fn fix_project(
        &self,
        project: &project::Model,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.is_under_removal(project).await? {
            info!(project = %project.projectname, "skipped, project is under removal");
            report.skipped_projects += 1;
            return Ok(());
        }
        for dataset in DatasetDAO::find_by_project(self.hopsworks, project.id).await? {
            info!(project = %project.projectname, dataset = %dataset.inode_name, "fixing dataset");
            self.fix_dataset(project, &dataset)
                .await
                .with_context(|| format!("fix dataset {}", dataset.inode_name))?;
            report.datasets += 1;
        }
        report.projects += 1;
        Ok(())
    }

    async fn rollback_project(
        &self,
        project: &project::Model,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.is_under_removal(project).await? {
            info!(project = %project.projectname, "skipped, project is under removal");
            report.skipped_projects += 1;
            return Ok(());
        }
        for dataset in DatasetDAO::find_by_project(self.hopsworks, project.id).await? {
            info!(project = %project.projectname, dataset = %dataset.inode_name, "rolling back dataset");
            self.rollback_dataset(project, &dataset)
                .await
                .with_context(|| format!("roll back dataset {}", dataset.inode_name))?;
            report.datasets += 1;
        }
        report.projects += 1;
        Ok(())
    }

    async fn locate(&self, dataset: &dataset::Model) -> Result<DatasetLocation> {
        let inode = InodeDAO::find(self.metadata, dataset.inode_id)
            .await?
            .ok_or_else(|| {
                PermissionError::IllegalState(format!(
                    "inode id={} of dataset {} not found",
                    dataset.inode_id, dataset.inode_name
                ))
            })?;
        let path = InodeDAO::path_of(self.metadata, &inode).await?;
        let owner = self
            .fs
            .find_user_by_id(inode.user_id)
            .await?
            .map(|u| u.name);
        Ok(DatasetLocation { inode, path, owner })
    }

    /// Returns the group, creating it first when absent.
    ///
    /// A group that still cannot be read back is an error, except in dry-run
    /// where creation never happened and a placeholder stands in.
    async fn get_or_create_group(&self, name: &str, path: &str) -> Result<HdfsGroup> {
        if let Some(group) = self.fs.find_group(name).await? {
            return Ok(group);
        }
        self.gate
            .run(
                format!("add missing group={name}"),
                self.fs.add_group(name),
            )
            .await?;
        match self.fs.find_group(name).await? {
            Some(group) => Ok(group),
            None if self.gate.is_dry_run() => Ok(HdfsGroup::placeholder(name)),
            None => Err(PermissionError::IllegalState(format!(
                "failed to get group={name} for dataset in path={path}"
            ))
            .into()),
        }
    }

    async fn ensure_user(&self, name: &str) -> Result<()> {
        if self.fs.find_user(name).await?.is_none() {
            self.gate
                .run(
                    format!("add missing user={name}"),
                    self.fs.add_user(name),
                )
                .await?;
        }
        Ok(())
    }

    async fn group_member_names(&self, group: &HdfsGroup) -> Result<HashSet<String>> {
        Ok(self
            .fs
            .group_members(group)
            .await?
            .into_iter()
            .map(|u| u.name)
            .collect())
    }

    async fn add_to_group(&self, user: &str, group: &HdfsGroup) -> Result<()> {
        self.gate
            .run(
                format!("add user={user} to group={}", group.name),
                self.fs.add_user_to_group(user, &group.name),
            )
            .await?;
        Ok(())
    }

    async fn remove_from_group(&self, user: &str, group: &HdfsGroup) -> Result<()> {
        self.gate
            .run(
                format!("remove user={user} from group={}", group.name),
                self.fs.remove_user_from_group(user, &group.name),
            )
            .await?;
        Ok(())
    }

    async fn fix_dataset(&self, project: &project::Model, dataset: &dataset::Model) -> Result<()> {
        let name = &dataset.inode_name;
        let location = self.locate(dataset).await?;
        let path = location.path.as_str();
        let groups = DatasetGroups {
            rw: self
                .get_or_create_group(&naming::dataset_group(&project.projectname, name), path)
                .await?,
            read: self
                .get_or_create_group(&naming::dataset_read_group(&project.projectname, name), path)
                .await?,
        };

        let acl = dataset_acl(&groups.read.name);
        self.gate
            .run(
                format!("set acl={} on path={path}", acl_spec(&acl)),
                self.fs.set_acl(path, &acl),
            )
            .await?;

        let permission = self.normalize_permission(dataset).await?;
        let bits = FsPermission::from_inode(location.inode.permission).with_acl(&acl);
        self.check_fs_permission(dataset, path, bits).await?;

        let owner = location.owner.as_deref();
        let members = self.project_members(project.id).await?;
        let mut desired: HashSet<String> = members.iter().map(hdfs_name).collect();
        self.fix_members(&members, &groups, owner, permission).await?;

        let public = dataset.public_ds > 0;
        for share in DatasetSharedWithDAO::find_by_dataset(self.hopsworks, dataset.id).await? {
            let mut share_permission = share.permission.clone();
            if public && share.permission != DatasetPermission::ReadOnly.as_str() {
                self.gate
                    .run(
                        format!("set permission of share id={} to READ_ONLY", share.id),
                        DatasetSharedWithDAO::update_permission(
                            self.hopsworks,
                            share.id,
                            DatasetPermission::ReadOnly,
                        ),
                    )
                    .await?;
                share_permission = DatasetPermission::ReadOnly.as_str().to_string();
            }
            if !share.accepted {
                debug!(share = share.id, "share not accepted, members ignored");
                continue;
            }
            let share_permission: DatasetPermission = share_permission.parse()?;
            let share_members = self.project_members(share.project).await?;
            desired.extend(share_members.iter().map(hdfs_name));
            self.fix_members(&share_members, &groups, None, share_permission)
                .await?;
        }

        self.remove_stale(&desired, &groups, owner).await
    }

    /// Forces public datasets to `READ_ONLY` and default datasets to `EDITABLE`.
    ///
    /// # Returns
    /// * `Result<DatasetPermission>` - The permission the rest of the pass works with.
    async fn normalize_permission(&self, dataset: &dataset::Model) -> Result<DatasetPermission> {
        let stored: DatasetPermission = dataset.permission.parse()?;
        let forced = if dataset.public_ds > 0 {
            Some(DatasetPermission::ReadOnly)
        } else if naming::is_default_dataset(&dataset.inode_name) {
            Some(DatasetPermission::Editable)
        } else {
            None
        };
        match forced {
            Some(target) if target != stored => {
                self.gate
                    .run(
                        format!("set permission of dataset id={} to {target}", dataset.id),
                        DatasetDAO::update_permission(self.hopsworks, dataset.id, target),
                    )
                    .await?;
                Ok(target)
            }
            _ => Ok(stored),
        }
    }

    /// `current` is the state left by the dataset ACL, which reopens the
    /// owner and group triplets, so a public dataset is made immutable on
    /// every pass.
    async fn check_fs_permission(
        &self,
        dataset: &dataset::Model,
        path: &str,
        current: FsPermission,
    ) -> Result<()> {
        if dataset.public_ds > 0 && !current.is_read_only() {
            self.gate
                .run(
                    format!("make public dataset at path={path} immutable"),
                    self.fs.modify_acl_entries(path, &immutable_acl()),
                )
                .await?;
        } else if dataset.public_ds == 0 && !current.is_dataset_default() {
            self.gate
                .run(
                    format!("set default permission for dataset at path={path}"),
                    self.fs.modify_acl_entries(path, &mutable_acl()),
                )
                .await?;
        }
        Ok(())
    }

    /// Moves every member into the group matching its access. Membership is
    /// read once per call, before any change.
    async fn fix_members(
        &self,
        members: &[ProjectMember],
        groups: &DatasetGroups,
        owner: Option<&str>,
        permission: DatasetPermission,
    ) -> Result<()> {
        let in_rw = self.group_member_names(&groups.rw).await?;
        let in_read = self.group_member_names(&groups.read).await?;
        for member in members {
            if member.username == naming::SERVICE_USER {
                continue;
            }
            let user = hdfs_name(member);
            self.ensure_user(&user).await?;
            if owner == Some(user.as_str()) {
                continue;
            }
            match desired_access(permission, &member.role) {
                Access::ReadWrite => {
                    if !in_rw.contains(&user) {
                        self.add_to_group(&user, &groups.rw).await?;
                    }
                    if in_read.contains(&user) {
                        self.remove_from_group(&user, &groups.read).await?;
                    }
                }
                Access::Read => {
                    if in_rw.contains(&user) {
                        self.remove_from_group(&user, &groups.rw).await?;
                    }
                    if !in_read.contains(&user) {
                        self.add_to_group(&user, &groups.read).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove_stale(
        &self,
        desired: &HashSet<String>,
        groups: &DatasetGroups,
        owner: Option<&str>,
    ) -> Result<()> {
        for group in [&groups.rw, &groups.read] {
            for user in self.group_member_names(group).await? {
                if owner == Some(user.as_str()) || desired.contains(&user) {
                    continue;
                }
                self.remove_from_group(&user, group).await?;
            }
        }
        Ok(())
    }

    async fn rollback_dataset(
        &self,
        project: &project::Model,
        dataset: &dataset::Model,
    ) -> Result<()> {
        let name = &dataset.inode_name;
        let rw_name = naming::dataset_group(&project.projectname, name);
        let read_name = naming::dataset_read_group(&project.projectname, name);
        let location = self.locate(dataset).await?;
        let path = location.path.as_str();

        let rw = self.fs.find_group(&rw_name).await?.ok_or_else(|| {
            PermissionError::IllegalState(format!(
                "failed to get group={rw_name} for dataset in path={path}"
            ))
        })?;
        if self.fs.find_group(&read_name).await?.is_some() {
            self.gate
                .run(
                    format!("remove group={read_name}"),
                    self.fs.remove_group(&read_name),
                )
                .await?;
        }

        let current = FsPermission::from_inode(location.inode.permission);
        let legacy = legacy_permission(name);
        if current != legacy {
            self.gate
                .run(
                    format!("roll back permission from={current} to={legacy} for path={path}"),
                    self.fs.set_permission(path, legacy),
                )
                .await?;
        }

        let mut team = self.project_members(project.id).await?;
        for share in DatasetSharedWithDAO::find_by_dataset(self.hopsworks, dataset.id).await? {
            if share.accepted {
                team.extend(self.project_members(share.project).await?);
            }
        }
        let owner = location.owner.as_deref();
        let in_rw = self.group_member_names(&rw).await?;
        for member in &team {
            if member.username == naming::SERVICE_USER {
                continue;
            }
            let user = hdfs_name(member);
            self.ensure_user(&user).await?;
            if owner == Some(user.as_str()) {
                continue;
            }
            if !in_rw.contains(&user) {
                self.add_to_group(&user, &rw).await?;
            }
        }
        Ok(())
    }
}

fn hdfs_name(member: &ProjectMember) -> String {
    naming::hdfs_user_name(&member.project_name, &member.username)
}

/// Permission bits datasets carried before the two-group model.
pub fn legacy_permission(dataset: &str) -> FsPermission {
    if naming::is_sticky_default_dataset(dataset) {
        FsPermission::DATASET_DEFAULT_STICKY
    } else if naming::is_default_dataset(dataset) {
        FsPermission::DATASET_DEFAULT
    } else {
        FsPermission::LEGACY_DEFAULT
    }
}
