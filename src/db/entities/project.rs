use sea_orm::entity::prelude::*;

/// Project row. `username` holds the owner's email.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "project")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub projectname: String,
    pub username: String,
    #[sea_orm(nullable)]
    pub created: Option<DateTime>,
    #[sea_orm(nullable)]
    pub deleted: Option<bool>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub docker_image: Option<String>,
    #[sea_orm(nullable)]
    pub python_version: Option<String>,
    pub conda_env: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
