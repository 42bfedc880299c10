use sea_orm::entity::prelude::*;

/// One path segment of the namespace; `parent_id` chains up to the root.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "hdfs_inodes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub user_id: i32,
    pub group_id: i32,
    pub permission: i16,
    pub size: i64,
    pub is_dir: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
