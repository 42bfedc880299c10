use super::reconcile::{Access, PermissionError, desired_access, legacy_permission};
use super::*;
use crate::config::HopsConfig;
use crate::db::dao::{DatasetDAO, DatasetSharedWithDAO, HdfsPrincipalDAO, InodeDAO};
use crate::db::entities::{
    HdfsInodeEntity, ProjectTeamEntity, hdfs_inode, hdfs_user, project, project_team,
};
use crate::db::schema::{fixtures, memory_databases};
use crate::db::{DatasetPermission, Databases, ProjectRole};
use crate::gate::WriteGate;
use crate::hdfs::acl::{acl_spec, dataset_acl, immutable_acl};
use crate::hdfs::{AclEntry, FsPermission, HdfsGroup, HdfsOps, HdfsUser, HopsFsClient};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum FsCall {
    SetAcl { path: String, spec: String },
    ModifyAcl { path: String, spec: String },
    SetPermission { path: String, permission: FsPermission },
}

/// Principals live in the metadata tables. Path operations are recorded and
/// their effect on the permission bits is written back to the inode row.
struct RecordingFs {
    principals: HopsFsClient,
    metadata: DatabaseConnection,
    calls: Mutex<Vec<FsCall>>,
    ignore_new_groups: bool,
}

impl RecordingFs {
    fn new(dbs: &Databases) -> Self {
        Self {
            principals: HopsFsClient::new(dbs.metadata.clone(), &HopsConfig::default()).unwrap(),
            metadata: dbs.metadata.clone(),
            calls: Mutex::new(vec![]),
            ignore_new_groups: false,
        }
    }

    fn calls(&self) -> Vec<FsCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn update_bits(&self, path: &str, apply: impl FnOnce(FsPermission) -> FsPermission) {
        for inode in HdfsInodeEntity::find().all(&self.metadata).await.unwrap() {
            if InodeDAO::path_of(&self.metadata, &inode).await.unwrap() != path {
                continue;
            }
            let bits = apply(FsPermission::from_inode(inode.permission));
            let mut row: hdfs_inode::ActiveModel = inode.into();
            row.permission = Set(bits.0 as i16);
            row.update(&self.metadata).await.unwrap();
            return;
        }
        panic!("no inode at {path}");
    }

    async fn members(&self, group: &str) -> Vec<String> {
        match self.find_group(group).await.unwrap() {
            Some(g) => self
                .group_members(&g)
                .await
                .unwrap()
                .into_iter()
                .map(|u| u.name)
                .collect(),
            None => vec![],
        }
    }
}

#[async_trait::async_trait]
impl HdfsOps for RecordingFs {
    async fn find_user(&self, name: &str) -> anyhow::Result<Option<HdfsUser>> {
        self.principals.find_user(name).await
    }

    async fn find_user_by_id(&self, id: i32) -> anyhow::Result<Option<HdfsUser>> {
        self.principals.find_user_by_id(id).await
    }

    async fn find_group(&self, name: &str) -> anyhow::Result<Option<HdfsGroup>> {
        self.principals.find_group(name).await
    }

    async fn group_members(&self, group: &HdfsGroup) -> anyhow::Result<Vec<HdfsUser>> {
        self.principals.group_members(group).await
    }

    async fn add_user(&self, name: &str) -> anyhow::Result<()> {
        self.principals.add_user(name).await
    }

    async fn add_group(&self, name: &str) -> anyhow::Result<()> {
        if self.ignore_new_groups {
            return Ok(());
        }
        self.principals.add_group(name).await
    }

    async fn remove_group(&self, name: &str) -> anyhow::Result<()> {
        self.principals.remove_group(name).await
    }

    async fn add_user_to_group(&self, user: &str, group: &str) -> anyhow::Result<()> {
        self.principals.add_user_to_group(user, group).await
    }

    async fn remove_user_from_group(&self, user: &str, group: &str) -> anyhow::Result<()> {
        self.principals.remove_user_from_group(user, group).await
    }

    async fn set_permission(&self, path: &str, permission: FsPermission) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(FsCall::SetPermission {
            path: path.to_string(),
            permission,
        });
        self.update_bits(path, |_| permission).await;
        Ok(())
    }

    async fn set_acl(&self, path: &str, entries: &[AclEntry]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(FsCall::SetAcl {
            path: path.to_string(),
            spec: acl_spec(entries),
        });
        self.update_bits(path, |bits| bits.with_acl(entries)).await;
        Ok(())
    }

    async fn modify_acl_entries(&self, path: &str, entries: &[AclEntry]) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(FsCall::ModifyAcl {
            path: path.to_string(),
            spec: acl_spec(entries),
        });
        self.update_bits(path, |bits| bits.with_acl(entries)).await;
        Ok(())
    }
}

/// Project `P` under `/Projects/P`, owned by the filesystem user `P__owner`.
struct World {
    dbs: Databases,
    project: project::Model,
    owner: hdfs_user::Model,
}

impl World {
    async fn new() -> Self {
        let dbs = memory_databases().await.unwrap();
        let project = fixtures::project(&dbs.hopsworks, "P", "owner@hopsworks.ai").await;
        fixtures::user(&dbs.hopsworks, "owner").await;
        fixtures::member(
            &dbs.hopsworks,
            project.id,
            "owner@hopsworks.ai",
            ProjectRole::DATA_OWNER,
        )
        .await;
        let owner = HdfsPrincipalDAO::insert_user(&dbs.metadata, "P__owner")
            .await
            .unwrap();
        fixtures::inode(&dbs.metadata, 1, 0, "", 0, 0o755).await;
        fixtures::inode(&dbs.metadata, 2, 1, "Projects", 0, 0o755).await;
        fixtures::inode(&dbs.metadata, 3, 2, "P", owner.id, 0o770).await;
        Self {
            dbs,
            project,
            owner,
        }
    }

    async fn member(&self, project_id: i32, username: &str, role: &str) {
        fixtures::user(&self.dbs.hopsworks, username).await;
        fixtures::member(
            &self.dbs.hopsworks,
            project_id,
            &format!("{username}@hopsworks.ai"),
            role,
        )
        .await;
    }

    async fn dataset(
        &self,
        name: &str,
        inode_id: i64,
        public_ds: i32,
        permission: DatasetPermission,
        bits: i16,
    ) -> i32 {
        fixtures::inode(&self.dbs.metadata, inode_id, 3, name, self.owner.id, bits).await;
        fixtures::dataset(
            &self.dbs.hopsworks,
            self.project.id,
            name,
            inode_id,
            public_ds,
            permission,
        )
        .await
        .id
    }

    fn reconciler<'a>(&'a self, fs: &'a RecordingFs, dry_run: bool) -> PermissionReconciler<'a> {
        PermissionReconciler::new(
            &self.dbs.hopsworks,
            &self.dbs.metadata,
            fs,
            WriteGate::new(dry_run),
        )
    }

    async fn bits_of(&self, inode_id: i64) -> FsPermission {
        let inode = InodeDAO::find(&self.dbs.metadata, inode_id)
            .await
            .unwrap()
            .unwrap();
        FsPermission::from_inode(inode.permission)
    }

    async fn permission_of(&self, dataset_id: i32) -> String {
        DatasetDAO::find(&self.dbs.hopsworks, dataset_id)
            .await
            .unwrap()
            .unwrap()
            .permission
    }
}

#[test]
fn test_desired_access() {
    let owner = ProjectRole::DataOwner;
    let scientist = ProjectRole::DataScientist;
    assert_eq!(desired_access(DatasetPermission::Editable, &scientist), Access::ReadWrite);
    assert_eq!(desired_access(DatasetPermission::ReadOnly, &owner), Access::Read);
    assert_eq!(
        desired_access(DatasetPermission::EditableByOwners, &owner),
        Access::ReadWrite
    );
    assert_eq!(
        desired_access(DatasetPermission::EditableByOwners, &scientist),
        Access::Read
    );
}

#[test]
fn test_legacy_permission() {
    assert_eq!(legacy_permission("Logs"), FsPermission::DATASET_DEFAULT_STICKY);
    assert_eq!(legacy_permission("demo_featurestore.db"), FsPermission::DATASET_DEFAULT_STICKY);
    assert_eq!(legacy_permission("Jupyter"), FsPermission::DATASET_DEFAULT);
    assert_eq!(legacy_permission("raw"), FsPermission::LEGACY_DEFAULT);
}

#[tokio::test]
async fn test_editable_by_owners_scenario() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    w.member(w.project.id, "carol", ProjectRole::DATA_SCIENTIST).await;
    w.dataset("D", 10, 0, DatasetPermission::EditableByOwners, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    w.reconciler(&fs, false).fix_all().await.unwrap();

    assert_eq!(fs.members("P__D").await, vec!["P__alice"]);
    assert_eq!(fs.members("P__D__read").await, vec!["P__carol"]);
    assert_eq!(
        fs.calls(),
        vec![FsCall::SetAcl {
            path: "/Projects/P/D".to_string(),
            spec: acl_spec(&dataset_acl("P__D__read")),
        }]
    );
}

#[tokio::test]
async fn test_public_dataset_becomes_read_only_and_immutable() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    let d2 = w
        .dataset("D2", 11, 1, DatasetPermission::Editable, 0o770)
        .await;

    let other = fixtures::project(&w.dbs.hopsworks, "Q", "bob@hopsworks.ai").await;
    w.member(other.id, "bob", ProjectRole::DATA_OWNER).await;
    let share = fixtures::share(
        &w.dbs.hopsworks,
        d2,
        other.id,
        true,
        DatasetPermission::Editable,
    )
    .await;
    let fs = RecordingFs::new(&w.dbs);

    w.reconciler(&fs, false).fix_all().await.unwrap();

    assert_eq!(w.permission_of(d2).await, "READ_ONLY");
    let shares = DatasetSharedWithDAO::find_by_dataset(&w.dbs.hopsworks, d2)
        .await
        .unwrap();
    assert_eq!(shares[0].id, share.id);
    assert_eq!(shares[0].permission, "READ_ONLY");

    assert!(fs.calls().contains(&FsCall::ModifyAcl {
        path: "/Projects/P/D2".to_string(),
        spec: acl_spec(&immutable_acl()),
    }));
    assert_eq!(w.bits_of(11).await, FsPermission::READ_ONLY);
    assert!(fs.members("P__D2").await.is_empty());
    assert_eq!(
        fs.members("P__D2__read").await,
        vec!["P__alice".to_string(), "Q__bob".to_string()]
    );
}

#[tokio::test]
async fn test_default_dataset_becomes_editable() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_SCIENTIST).await;
    let logs = w
        .dataset("Logs", 12, 0, DatasetPermission::ReadOnly, 0o1770)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    w.reconciler(&fs, false).fix_all().await.unwrap();

    assert_eq!(w.permission_of(logs).await, "EDITABLE");
    assert_eq!(fs.members("P__Logs").await, vec!["P__alice"]);
    assert!(fs.members("P__Logs__read").await.is_empty());
    // sticky default bits are already right, only the dataset ACL is written
    assert_eq!(fs.calls().len(), 1);
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    w.member(w.project.id, "carol", ProjectRole::DATA_SCIENTIST).await;
    w.dataset("D", 10, 0, DatasetPermission::Editable, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);
    let reconciler = w.reconciler(&fs, false);

    reconciler.fix_all().await.unwrap();
    let rw = fs.members("P__D").await;
    let read = fs.members("P__D__read").await;
    reconciler.fix_all().await.unwrap();

    assert_eq!(rw, vec!["P__alice", "P__carol"]);
    assert!(read.is_empty());
    assert_eq!(fs.members("P__D").await, rw);
    assert_eq!(fs.members("P__D__read").await, read);
}

#[tokio::test]
async fn test_public_dataset_stays_read_only_on_rerun() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    w.dataset("D2", 11, 1, DatasetPermission::Editable, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);
    let reconciler = w.reconciler(&fs, false);

    reconciler.fix_all().await.unwrap();
    assert_eq!(w.bits_of(11).await, FsPermission::READ_ONLY);
    let first = fs.calls();

    reconciler.fix_all().await.unwrap();
    assert_eq!(w.bits_of(11).await, FsPermission::READ_ONLY);

    // the dataset ACL reopens the bits, the merged immutable entries close them again
    let path = "/Projects/P/D2".to_string();
    let expected = vec![
        FsCall::SetAcl {
            path: path.clone(),
            spec: acl_spec(&dataset_acl("P__D2__read")),
        },
        FsCall::ModifyAcl {
            path,
            spec: acl_spec(&immutable_acl()),
        },
    ];
    assert_eq!(first, expected);
    assert_eq!(fs.calls()[first.len()..], expected[..]);
    assert_eq!(fs.members("P__D2__read").await, vec!["P__alice"]);
}

#[tokio::test]
async fn test_shared_and_default_datasets_converge() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_SCIENTIST).await;
    let d = w
        .dataset("D", 10, 0, DatasetPermission::EditableByOwners, 0o750)
        .await;
    w.dataset("Logs", 12, 0, DatasetPermission::ReadOnly, 0o1550)
        .await;
    let other = fixtures::project(&w.dbs.hopsworks, "Q", "bob@hopsworks.ai").await;
    w.member(other.id, "bob", ProjectRole::DATA_OWNER).await;
    fixtures::share(&w.dbs.hopsworks, d, other.id, true, DatasetPermission::Editable).await;
    let fs = RecordingFs::new(&w.dbs);
    let reconciler = w.reconciler(&fs, false);

    reconciler.fix_all().await.unwrap();
    let snapshot = (
        w.bits_of(10).await,
        w.bits_of(12).await,
        fs.members("P__D").await,
        fs.members("P__D__read").await,
        fs.members("P__Logs").await,
    );
    assert_eq!(snapshot.0, FsPermission::DATASET_DEFAULT);
    assert_eq!(snapshot.1, FsPermission::DATASET_DEFAULT_STICKY);
    assert_eq!(snapshot.2, vec!["Q__bob"]);
    assert_eq!(snapshot.3, vec!["P__alice"]);
    assert_eq!(snapshot.4, vec!["P__alice"]);

    reconciler.fix_all().await.unwrap();

    assert_eq!(
        (
            w.bits_of(10).await,
            w.bits_of(12).await,
            fs.members("P__D").await,
            fs.members("P__D__read").await,
            fs.members("P__Logs").await,
        ),
        snapshot
    );
    assert!(
        !fs.calls()
            .iter()
            .any(|c| matches!(c, FsCall::ModifyAcl { .. }))
    );
}

#[tokio::test]
async fn test_removed_member_is_cleaned_up_except_owner() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    w.member(w.project.id, "dave", ProjectRole::DATA_SCIENTIST).await;
    w.dataset("D", 10, 0, DatasetPermission::EditableByOwners, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);
    let reconciler = w.reconciler(&fs, false);

    reconciler.fix_all().await.unwrap();
    assert_eq!(fs.members("P__D__read").await, vec!["P__dave"]);
    // the dataset owner is never removed from a group
    fs.add_user_to_group("P__owner", "P__D").await.unwrap();

    ProjectTeamEntity::delete_many()
        .filter(project_team::Column::TeamMember.eq("dave@hopsworks.ai"))
        .exec(&w.dbs.hopsworks)
        .await
        .unwrap();
    reconciler.fix_all().await.unwrap();

    assert_eq!(fs.members("P__D").await, vec!["P__alice", "P__owner"]);
    assert!(fs.members("P__D__read").await.is_empty());
}

#[tokio::test]
async fn test_owner_and_service_user_are_untouched() {
    let w = World::new().await;
    w.member(w.project.id, "srvmanager", ProjectRole::DATA_OWNER).await;
    w.dataset("D", 10, 0, DatasetPermission::Editable, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    w.reconciler(&fs, false).fix_all().await.unwrap();

    assert!(fs.members("P__D").await.is_empty());
    assert!(fs.find_user("P__srvmanager").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unaccepted_share_members_are_ignored() {
    let w = World::new().await;
    let d = w
        .dataset("D", 10, 0, DatasetPermission::Editable, 0o770)
        .await;
    let other = fixtures::project(&w.dbs.hopsworks, "Q", "bob@hopsworks.ai").await;
    w.member(other.id, "bob", ProjectRole::DATA_OWNER).await;
    fixtures::share(&w.dbs.hopsworks, d, other.id, false, DatasetPermission::Editable).await;
    let fs = RecordingFs::new(&w.dbs);

    w.reconciler(&fs, false).fix_all().await.unwrap();

    assert!(fs.members("P__D").await.is_empty());
    assert!(fs.members("P__D__read").await.is_empty());
}

#[tokio::test]
async fn test_project_under_removal_is_skipped() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::UNDER_REMOVAL).await;
    w.dataset("D", 10, 1, DatasetPermission::Editable, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    let report = w.reconciler(&fs, false).fix_all().await.unwrap();

    assert_eq!(report.skipped_projects, 1);
    assert_eq!(report.datasets, 0);
    assert!(fs.find_group("P__D").await.unwrap().is_none());
    assert!(fs.calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_leaves_state_untouched() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    let d2 = w
        .dataset("D2", 11, 1, DatasetPermission::Editable, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    let report = w.reconciler(&fs, true).fix_all().await.unwrap();

    assert_eq!(report.datasets, 1);
    assert_eq!(w.permission_of(d2).await, "EDITABLE");
    assert!(fs.find_group("P__D2").await.unwrap().is_none());
    assert!(fs.find_user("P__alice").await.unwrap().is_none());
    assert!(fs.calls().is_empty());
}

#[tokio::test]
async fn test_group_that_cannot_be_created_is_illegal_state() {
    let w = World::new().await;
    w.dataset("D", 10, 0, DatasetPermission::Editable, 0o770)
        .await;
    let mut fs = RecordingFs::new(&w.dbs);
    fs.ignore_new_groups = true;

    let err = w.reconciler(&fs, false).fix_all().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PermissionError>(),
        Some(PermissionError::IllegalState(msg)) if msg.contains("P__D")
    ));
    assert!(fs.calls().is_empty());
}

#[tokio::test]
async fn test_rollback_restores_single_group() {
    let w = World::new().await;
    w.member(w.project.id, "alice", ProjectRole::DATA_OWNER).await;
    w.member(w.project.id, "carol", ProjectRole::DATA_SCIENTIST).await;
    w.dataset("D", 10, 0, DatasetPermission::EditableByOwners, 0o770)
        .await;
    let fs = RecordingFs::new(&w.dbs);
    let reconciler = w.reconciler(&fs, false);
    reconciler.fix_all().await.unwrap();
    assert_eq!(fs.members("P__D__read").await, vec!["P__carol"]);

    reconciler.rollback_all().await.unwrap();

    assert!(fs.find_group("P__D__read").await.unwrap().is_none());
    assert_eq!(fs.members("P__D").await, vec!["P__alice", "P__carol"]);
    assert_eq!(
        fs.calls().last(),
        Some(&FsCall::SetPermission {
            path: "/Projects/P/D".to_string(),
            permission: FsPermission::LEGACY_DEFAULT,
        })
    );
}

#[tokio::test]
async fn test_rollback_without_group_fails() {
    let w = World::new().await;
    w.dataset("D", 10, 0, DatasetPermission::Editable, 0o750)
        .await;
    let fs = RecordingFs::new(&w.dbs);

    let err = w.reconciler(&fs, false).rollback_all().await.unwrap_err();

    assert!(err.downcast_ref::<PermissionError>().is_some());
}
