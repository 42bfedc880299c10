//! In-memory schema used by the test suites.
pub mod m20240101_000001_create_platform_tables;
pub mod m20240101_000002_create_metadata_tables;

use crate::db::Databases;
use crate::db::connect_database;
use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

/// Migrator for the platform and metadata tables.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn sea_orm_migration::MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_platform_tables::Migration),
            Box::new(m20240101_000002_create_metadata_tables::Migration),
        ]
    }
}

/// Opens a fresh in-memory SQLite database with every table created.
pub async fn memory_database() -> Result<DatabaseConnection, DbErr> {
    // a single connection keeps every query on the same in-memory database
    let conn = connect_database("sqlite::memory:", 1).await?;
    Migrator::up(&conn, None).await?;
    Ok(conn)
}

/// Both schemas backed by the same in-memory database.
pub async fn memory_databases() -> Result<Databases, DbErr> {
    let conn = memory_database().await?;
    Ok(Databases {
        hopsworks: conn.clone(),
        metadata: conn,
    })
}

/// Row builders shared by the test suites.
pub mod fixtures {
    use crate::db::entities::{
        dataset, dataset_shared_with, execution, hdfs_inode, job, jupyter_settings, project,
        project_team, user,
    };
    use crate::db::types::DatasetPermission;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    pub async fn project(conn: &DatabaseConnection, name: &str, owner_email: &str) -> project::Model {
        project::ActiveModel {
            projectname: Set(name.to_string()),
            username: Set(owner_email.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn user(conn: &DatabaseConnection, username: &str) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(format!("{username}@hopsworks.ai")),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn member(conn: &DatabaseConnection, project_id: i32, email: &str, role: &str) {
        project_team::ActiveModel {
            project_id: Set(project_id),
            team_member: Set(email.to_string()),
            team_role: Set(role.to_string()),
            added: Set(None),
        }
        .insert(conn)
        .await
        .unwrap();
    }

    pub async fn dataset(
        conn: &DatabaseConnection,
        project_id: i32,
        name: &str,
        inode_id: i64,
        public_ds: i32,
        permission: DatasetPermission,
    ) -> dataset::Model {
        dataset::ActiveModel {
            project_id: Set(project_id),
            inode_name: Set(name.to_string()),
            inode_id: Set(inode_id),
            public_ds: Set(public_ds),
            permission: Set(permission.as_str().to_string()),
            dstype: Set("DATASET".to_string()),
            description: Set(None),
            searchable: Set(Some(true)),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn share(
        conn: &DatabaseConnection,
        dataset_id: i32,
        project_id: i32,
        accepted: bool,
        permission: DatasetPermission,
    ) -> dataset_shared_with::Model {
        dataset_shared_with::ActiveModel {
            dataset: Set(dataset_id),
            project: Set(project_id),
            accepted: Set(accepted),
            shared_on: Set(None),
            permission: Set(permission.as_str().to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn inode(
        conn: &DatabaseConnection,
        id: i64,
        parent_id: i64,
        name: &str,
        user_id: i32,
        permission: i16,
    ) -> hdfs_inode::Model {
        hdfs_inode::ActiveModel {
            id: Set(id),
            parent_id: Set(parent_id),
            name: Set(name.to_string()),
            user_id: Set(user_id),
            group_id: Set(0),
            permission: Set(permission),
            size: Set(0),
            is_dir: Set(true),
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn job(conn: &DatabaseConnection, project_id: i32, job_type: &str, config: &str) -> job::Model {
        job::ActiveModel {
            name: Set(format!("{}-job", job_type.to_lowercase())),
            project_id: Set(project_id),
            job_type: Set(job_type.to_string()),
            json_config: Set(config.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn execution(conn: &DatabaseConnection, job_id: i32, args: Option<&str>) -> execution::Model {
        execution::ActiveModel {
            job_id: Set(job_id),
            args: Set(args.map(str::to_string)),
            ..Default::default()
        }
        .insert(conn)
        .await
        .unwrap()
    }

    pub async fn enable_conda(conn: &DatabaseConnection, project: project::Model) -> project::Model {
        let mut row: project::ActiveModel = project.into();
        row.conda_env = Set(true);
        row.update(conn).await.unwrap()
    }

    pub async fn jupyter_settings(
        conn: &DatabaseConnection,
        project_id: i32,
        team_member: &str,
        docker_config: Option<&str>,
    ) {
        jupyter_settings::ActiveModel {
            project_id: Set(project_id),
            team_member: Set(team_member.to_string()),
            docker_config: Set(docker_config.map(str::to_string)),
        }
        .insert(conn)
        .await
        .unwrap();
    }
}
