use crate::db::entities::{
    DatasetEntity, DatasetSharedWithEntity, ExecutionEntity, HdfsGroupEntity, HdfsInodeEntity,
    HdfsUserEntity, HdfsUserGroupEntity, JobEntity, JupyterSettingsEntity, ProjectEntity,
    ProjectTeamEntity, UserEntity, dataset, dataset_shared_with, execution, hdfs_group,
    hdfs_inode, hdfs_user, hdfs_user_group, job, jupyter_settings, project, project_team, user,
};
use crate::db::types::{DatasetPermission, ProjectRole};
use anyhow::{Context, Result, bail};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// A `project_team` row joined with its user and project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMember {
    pub project_id: i32,
    pub project_name: String,
    pub email: String,
    pub username: String,
    pub role: ProjectRole,
}

pub struct ProjectDAO;

impl ProjectDAO {
    pub async fn find_all<C: ConnectionTrait>(conn: &C) -> Result<Vec<project::Model>> {
        ProjectEntity::find()
            .order_by_asc(project::Column::Id)
            .all(conn)
            .await
            .context("Failed to load projects")
    }

    pub async fn find_with_conda<C: ConnectionTrait>(conn: &C) -> Result<Vec<project::Model>> {
        ProjectEntity::find()
            .filter(project::Column::CondaEnv.eq(true))
            .order_by_asc(project::Column::Id)
            .all(conn)
            .await
            .context("Failed to load projects with a conda environment")
    }

    pub async fn find<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<project::Model>> {
        ProjectEntity::find_by_id(id)
            .one(conn)
            .await
            .with_context(|| format!("Failed to load project id={id}"))
    }

    /// Loads every project together with its owner's username.
    ///
    /// Projects whose owner email has no `users` row are left out.
    pub async fn find_all_with_owner<C: ConnectionTrait>(
        conn: &C,
    ) -> Result<Vec<(project::Model, String)>> {
        let projects = Self::find_all(conn).await?;
        let emails: Vec<String> = projects.iter().map(|p| p.username.clone()).collect();
        let owners: HashMap<String, String> = UserEntity::find()
            .filter(user::Column::Email.is_in(emails))
            .all(conn)
            .await
            .context("Failed to load project owners")?
            .into_iter()
            .map(|u| (u.email, u.username))
            .collect();

        Ok(projects
            .into_iter()
            .filter_map(|p| {
                let owner = owners.get(&p.username)?.clone();
                Some((p, owner))
            })
            .collect())
    }
}

pub struct DatasetDAO;

impl DatasetDAO {
    #[cfg(test)]
    pub async fn find<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<dataset::Model>> {
        DatasetEntity::find_by_id(id)
            .one(conn)
            .await
            .with_context(|| format!("Failed to load dataset id={id}"))
    }

    pub async fn find_by_project<C: ConnectionTrait>(
        conn: &C,
        project_id: i32,
    ) -> Result<Vec<dataset::Model>> {
        DatasetEntity::find()
            .filter(dataset::Column::ProjectId.eq(project_id))
            .order_by_asc(dataset::Column::Id)
            .all(conn)
            .await
            .with_context(|| format!("Failed to load datasets of project id={project_id}"))
    }

    pub async fn update_permission<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        permission: DatasetPermission,
    ) -> Result<()> {
        DatasetEntity::update_many()
            .col_expr(dataset::Column::Permission, Expr::value(permission.as_str()))
            .filter(dataset::Column::Id.eq(id))
            .exec(conn)
            .await
            .with_context(|| format!("Failed to update permission of dataset id={id}"))?;
        Ok(())
    }
}

pub struct DatasetSharedWithDAO;

impl DatasetSharedWithDAO {
    pub async fn find_by_dataset<C: ConnectionTrait>(
        conn: &C,
        dataset_id: i32,
    ) -> Result<Vec<dataset_shared_with::Model>> {
        DatasetSharedWithEntity::find()
            .filter(dataset_shared_with::Column::Dataset.eq(dataset_id))
            .order_by_asc(dataset_shared_with::Column::Id)
            .all(conn)
            .await
            .with_context(|| format!("Failed to load shares of dataset id={dataset_id}"))
    }

    pub async fn update_permission<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        permission: DatasetPermission,
    ) -> Result<()> {
        DatasetSharedWithEntity::update_many()
            .col_expr(
                dataset_shared_with::Column::Permission,
                Expr::value(permission.as_str()),
            )
            .filter(dataset_shared_with::Column::Id.eq(id))
            .exec(conn)
            .await
            .with_context(|| format!("Failed to update permission of share id={id}"))?;
        Ok(())
    }
}

pub struct ProjectMemberDAO;

impl ProjectMemberDAO {
    /// Members of a project. Team rows without a matching user are dropped.
    pub async fn find_by_project<C: ConnectionTrait>(
        conn: &C,
        project_id: i32,
    ) -> Result<Vec<ProjectMember>> {
        let Some(project) = ProjectDAO::find(conn, project_id).await? else {
            debug!(project_id, "project not found while loading members");
            return Ok(vec![]);
        };
        let team = ProjectTeamEntity::find()
            .filter(project_team::Column::ProjectId.eq(project_id))
            .order_by_asc(project_team::Column::TeamMember)
            .all(conn)
            .await
            .with_context(|| format!("Failed to load team of project id={project_id}"))?;
        let emails: Vec<String> = team.iter().map(|t| t.team_member.clone()).collect();
        let usernames: HashMap<String, String> = UserEntity::find()
            .filter(user::Column::Email.is_in(emails))
            .all(conn)
            .await
            .context("Failed to load team users")?
            .into_iter()
            .map(|u| (u.email, u.username))
            .collect();

        Ok(team
            .into_iter()
            .filter_map(|t| {
                let username = usernames.get(&t.team_member)?.clone();
                Some(ProjectMember {
                    project_id,
                    project_name: project.projectname.clone(),
                    email: t.team_member,
                    username,
                    role: ProjectRole::parse(&t.team_role),
                })
            })
            .collect())
    }
}

/// A job configuration rewrite, optionally paired with new `args` for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct JobArgsUpdate {
    pub job_id: i32,
    pub json_config: String,
    pub execution_args: Option<(i32, String)>,
}

pub struct JobDAO;

impl JobDAO {
    pub async fn find_all<C: ConnectionTrait>(conn: &C) -> Result<Vec<job::Model>> {
        JobEntity::find()
            .order_by_asc(job::Column::Id)
            .all(conn)
            .await
            .context("Failed to load jobs")
    }

    pub async fn find_by_type<C: ConnectionTrait>(conn: &C, job_type: &str) -> Result<Vec<job::Model>> {
        JobEntity::find()
            .filter(job::Column::JobType.eq(job_type))
            .order_by_asc(job::Column::Id)
            .all(conn)
            .await
            .with_context(|| format!("Failed to load jobs of type {job_type}"))
    }

    /// Writes all `(id, json_config)` pairs in a single transaction.
    pub async fn update_configs(conn: &DatabaseConnection, updates: &[(i32, String)]) -> Result<()> {
        let txn = conn
            .begin()
            .await
            .context("Failed to start database transaction")?;
        for (id, config) in updates {
            JobEntity::update_many()
                .col_expr(job::Column::JsonConfig, Expr::value(config.clone()))
                .filter(job::Column::Id.eq(*id))
                .exec(&txn)
                .await
                .with_context(|| format!("Failed to update job id={id}"))?;
        }
        txn.commit()
            .await
            .context("Failed to commit database transaction")?;
        info!("Updated {} job configurations", updates.len());
        Ok(())
    }

    /// Writes configurations and execution arguments in a single transaction.
    pub async fn update_configs_with_args(
        conn: &DatabaseConnection,
        updates: &[JobArgsUpdate],
    ) -> Result<()> {
        let txn = conn
            .begin()
            .await
            .context("Failed to start database transaction")?;
        for update in updates {
            JobEntity::update_many()
                .col_expr(job::Column::JsonConfig, Expr::value(update.json_config.clone()))
                .filter(job::Column::Id.eq(update.job_id))
                .exec(&txn)
                .await
                .with_context(|| format!("Failed to update job id={}", update.job_id))?;
            if let Some((execution_id, args)) = &update.execution_args {
                ExecutionEntity::update_many()
                    .col_expr(execution::Column::Args, Expr::value(args.clone()))
                    .filter(execution::Column::Id.eq(*execution_id))
                    .exec(&txn)
                    .await
                    .with_context(|| format!("Failed to update execution id={execution_id}"))?;
            }
        }
        txn.commit()
            .await
            .context("Failed to commit database transaction")?;
        info!("Updated {} job configurations and their executions", updates.len());
        Ok(())
    }
}

pub struct ExecutionDAO;

impl ExecutionDAO {
    /// Latest execution of every job that ran at least once, keyed by job id.
    pub async fn latest_by_job<C: ConnectionTrait>(
        conn: &C,
    ) -> Result<HashMap<i32, execution::Model>> {
        let executions = ExecutionEntity::find()
            .order_by_asc(execution::Column::Id)
            .all(conn)
            .await
            .context("Failed to load executions")?;
        Ok(executions.into_iter().map(|e| (e.job_id, e)).collect())
    }
}

pub struct JupyterSettingsDAO;

impl JupyterSettingsDAO {
    pub async fn find_all<C: ConnectionTrait>(conn: &C) -> Result<Vec<jupyter_settings::Model>> {
        JupyterSettingsEntity::find()
            .order_by_asc(jupyter_settings::Column::ProjectId)
            .order_by_asc(jupyter_settings::Column::TeamMember)
            .all(conn)
            .await
            .context("Failed to load jupyter settings")
    }

    /// Writes all docker configurations keyed by `(project_id, team_member)` in one transaction.
    pub async fn update_docker_configs(
        conn: &DatabaseConnection,
        updates: &[((i32, String), String)],
    ) -> Result<()> {
        let txn = conn
            .begin()
            .await
            .context("Failed to start database transaction")?;
        for ((project_id, team_member), config) in updates {
            JupyterSettingsEntity::update_many()
                .col_expr(
                    jupyter_settings::Column::DockerConfig,
                    Expr::value(config.clone()),
                )
                .filter(jupyter_settings::Column::ProjectId.eq(*project_id))
                .filter(jupyter_settings::Column::TeamMember.eq(team_member.as_str()))
                .exec(&txn)
                .await
                .with_context(|| {
                    format!("Failed to update jupyter settings of project id={project_id}")
                })?;
        }
        txn.commit()
            .await
            .context("Failed to commit database transaction")?;
        info!("Updated {} jupyter settings", updates.len());
        Ok(())
    }
}

pub struct InodeDAO;

impl InodeDAO {
    pub async fn find<C: ConnectionTrait>(conn: &C, id: i64) -> Result<Option<hdfs_inode::Model>> {
        HdfsInodeEntity::find_by_id(id)
            .one(conn)
            .await
            .with_context(|| format!("Failed to load inode id={id}"))
    }

    /// Rebuilds the absolute path of an inode by walking its parent chain.
    ///
    /// # Arguments
    /// * `conn` - Metadata database connection.
    /// * `inode` - The leaf inode.
    ///
    /// # Returns
    /// * `Result<String>` - `/`-joined names from the root down to `inode`.
    pub async fn path_of<C: ConnectionTrait>(conn: &C, inode: &hdfs_inode::Model) -> Result<String> {
        let mut segments = vec![inode.name.clone()];
        let mut seen = HashSet::from([inode.id]);
        let mut parent_id = inode.parent_id;
        while let Some(parent) = Self::find(conn, parent_id).await? {
            if !seen.insert(parent.id) {
                bail!("inode parent chain loops at id={}", parent.id);
            }
            segments.push(parent.name.clone());
            parent_id = parent.parent_id;
        }
        segments.reverse();
        let path = segments.join("/");
        if path.starts_with('/') {
            Ok(path)
        } else {
            Ok(format!("/{path}"))
        }
    }
}

/// Users, groups and memberships of the filesystem's authorization tables.
pub struct HdfsPrincipalDAO;

impl HdfsPrincipalDAO {
    pub async fn find_user<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Option<hdfs_user::Model>> {
        HdfsUserEntity::find()
            .filter(hdfs_user::Column::Name.eq(name))
            .one(conn)
            .await
            .with_context(|| format!("Failed to load hdfs user {name}"))
    }

    pub async fn find_user_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<Option<hdfs_user::Model>> {
        HdfsUserEntity::find_by_id(id)
            .one(conn)
            .await
            .with_context(|| format!("Failed to load hdfs user id={id}"))
    }

    pub async fn find_group<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<Option<hdfs_group::Model>> {
        HdfsGroupEntity::find()
            .filter(hdfs_group::Column::Name.eq(name))
            .one(conn)
            .await
            .with_context(|| format!("Failed to load hdfs group {name}"))
    }

    pub async fn users_in_group<C: ConnectionTrait>(
        conn: &C,
        group_id: i32,
    ) -> Result<Vec<hdfs_user::Model>> {
        let user_ids: Vec<i32> = HdfsUserGroupEntity::find()
            .filter(hdfs_user_group::Column::GroupId.eq(group_id))
            .all(conn)
            .await
            .with_context(|| format!("Failed to load members of group id={group_id}"))?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        HdfsUserEntity::find()
            .filter(hdfs_user::Column::Id.is_in(user_ids))
            .order_by_asc(hdfs_user::Column::Name)
            .all(conn)
            .await
            .context("Failed to load group members")
    }

    pub async fn insert_user<C: ConnectionTrait>(conn: &C, name: &str) -> Result<hdfs_user::Model> {
        hdfs_user::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .with_context(|| format!("Failed to insert hdfs user {name}"))
    }

    pub async fn insert_group<C: ConnectionTrait>(conn: &C, name: &str) -> Result<hdfs_group::Model> {
        hdfs_group::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .with_context(|| format!("Failed to insert hdfs group {name}"))
    }

    /// Deletes a group and every membership pointing at it.
    pub async fn delete_group<C: ConnectionTrait>(conn: &C, group_id: i32) -> Result<()> {
        HdfsUserGroupEntity::delete_many()
            .filter(hdfs_user_group::Column::GroupId.eq(group_id))
            .exec(conn)
            .await
            .with_context(|| format!("Failed to delete memberships of group id={group_id}"))?;
        HdfsGroupEntity::delete_by_id(group_id)
            .exec(conn)
            .await
            .with_context(|| format!("Failed to delete group id={group_id}"))?;
        Ok(())
    }

    /// Adds a membership. An existing membership is left as is.
    pub async fn add_membership<C: ConnectionTrait>(conn: &C, user_id: i32, group_id: i32) -> Result<()> {
        let existing = HdfsUserGroupEntity::find_by_id((user_id, group_id))
            .one(conn)
            .await
            .context("Failed to load membership")?;
        if existing.is_some() {
            return Ok(());
        }
        hdfs_user_group::ActiveModel {
            user_id: Set(user_id),
            group_id: Set(group_id),
        }
        .insert(conn)
        .await
        .with_context(|| format!("Failed to add user id={user_id} to group id={group_id}"))?;
        Ok(())
    }

    pub async fn remove_membership<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        group_id: i32,
    ) -> Result<()> {
        HdfsUserGroupEntity::delete_by_id((user_id, group_id))
            .exec(conn)
            .await
            .with_context(|| format!("Failed to remove user id={user_id} from group id={group_id}"))?;
        Ok(())
    }
}
