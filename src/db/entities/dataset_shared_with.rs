use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dataset_shared_with")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub dataset: i32,
    /// Project the dataset is shared with.
    pub project: i32,
    pub accepted: bool,
    #[sea_orm(nullable)]
    pub shared_on: Option<DateTime>,
    pub permission: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
