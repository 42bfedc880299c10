use sea_orm::entity::prelude::*;

/// Dataset row. Only `permission` is ever written back.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dataset")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_name = "projectId")]
    pub project_id: i32,
    pub inode_name: String,
    pub inode_id: i64,
    pub public_ds: i32,
    pub permission: String,
    pub dstype: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub searchable: Option<bool>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
