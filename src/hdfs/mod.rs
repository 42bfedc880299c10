//! Filesystem authorization: principals, permission bits and ACLs.
pub mod acl;
pub mod client;

use acl::{AclScope, AclType};
use anyhow::Result;
use std::fmt;

pub use acl::AclEntry;
pub use client::HopsFsClient;

pub type HdfsUser = crate::db::entities::hdfs_user::Model;

/// A group as seen by the reconciliator. `id` is `None` for a group that only
/// exists in a dry-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdfsGroup {
    pub id: Option<i32>,
    pub name: String,
}

impl HdfsGroup {
    pub fn placeholder(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

impl From<crate::db::entities::hdfs_group::Model> for HdfsGroup {
    fn from(m: crate::db::entities::hdfs_group::Model) -> Self {
        Self {
            id: Some(m.id),
            name: m.name,
        }
    }
}

/// POSIX permission bits including the sticky bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsPermission(pub u16);

impl FsPermission {
    pub const READ_ONLY: FsPermission = FsPermission(0o550);
    pub const READ_ONLY_STICKY: FsPermission = FsPermission(0o1550);
    pub const DATASET_DEFAULT: FsPermission = FsPermission(0o770);
    pub const DATASET_DEFAULT_STICKY: FsPermission = FsPermission(0o1770);
    pub const LEGACY_DEFAULT: FsPermission = FsPermission(0o750);

    /// Reads the `permission` column of an inode, which stores the bits as a signed short.
    pub fn from_inode(bits: i16) -> Self {
        FsPermission(bits as u16 & 0o7777)
    }

    pub fn is_read_only(self) -> bool {
        self == Self::READ_ONLY || self == Self::READ_ONLY_STICKY
    }

    pub fn is_dataset_default(self) -> bool {
        self == Self::DATASET_DEFAULT || self == Self::DATASET_DEFAULT_STICKY
    }

    /// Bits after writing `entries`: unnamed access entries replace the
    /// owner, group and other triplets, the sticky bit is kept.
    pub fn with_acl(self, entries: &[AclEntry]) -> Self {
        entries
            .iter()
            .filter(|e| e.scope == AclScope::Access && e.name.is_none())
            .fold(self, |FsPermission(bits), e| {
                let shift = match e.kind {
                    AclType::User => 6,
                    AclType::Group => 3,
                    AclType::Other => 0,
                };
                FsPermission((bits & !(0o7 << shift)) | (e.action.bits() << shift))
            })
    }
}

/// Octal form, as accepted by `SETPERMISSION`.
impl fmt::Display for FsPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

/// Operations of the filesystem client used by the migration steps.
///
/// Reads never mutate. Callers route every mutating method through
/// [`crate::gate::WriteGate`].
#[async_trait::async_trait]
pub trait HdfsOps: Send + Sync {
    async fn find_user(&self, name: &str) -> Result<Option<HdfsUser>>;
    async fn find_user_by_id(&self, id: i32) -> Result<Option<HdfsUser>>;
    async fn find_group(&self, name: &str) -> Result<Option<HdfsGroup>>;
    /// Current members. A placeholder group has none.
    async fn group_members(&self, group: &HdfsGroup) -> Result<Vec<HdfsUser>>;

    async fn add_user(&self, name: &str) -> Result<()>;
    async fn add_group(&self, name: &str) -> Result<()>;
    async fn remove_group(&self, name: &str) -> Result<()>;
    async fn add_user_to_group(&self, user: &str, group: &str) -> Result<()>;
    async fn remove_user_from_group(&self, user: &str, group: &str) -> Result<()>;
    async fn set_permission(&self, path: &str, permission: FsPermission) -> Result<()>;
    /// Replaces the whole ACL of `path`.
    async fn set_acl(&self, path: &str, entries: &[AclEntry]) -> Result<()>;
    /// Adds or updates `entries`, leaving the other entries of `path` alone.
    async fn modify_acl_entries(&self, path: &str, entries: &[AclEntry]) -> Result<()>;
}
