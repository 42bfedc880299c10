//! Entities mirrored from the platform (`hopsworks`) and metadata (`hops`) schemas.
pub mod dataset;
pub mod dataset_shared_with;
pub mod execution;
pub mod hdfs_group;
pub mod hdfs_inode;
pub mod hdfs_user;
pub mod hdfs_user_group;
pub mod job;
pub mod jupyter_settings;
pub mod project;
pub mod project_team;
pub mod user;

pub use dataset::Entity as DatasetEntity;
pub use dataset_shared_with::Entity as DatasetSharedWithEntity;
pub use execution::Entity as ExecutionEntity;
pub use hdfs_group::Entity as HdfsGroupEntity;
pub use hdfs_inode::Entity as HdfsInodeEntity;
pub use hdfs_user::Entity as HdfsUserEntity;
pub use hdfs_user_group::Entity as HdfsUserGroupEntity;
pub use job::Entity as JobEntity;
pub use jupyter_settings::Entity as JupyterSettingsEntity;
pub use project::Entity as ProjectEntity;
pub use project_team::Entity as ProjectTeamEntity;
pub use user::Entity as UserEntity;
