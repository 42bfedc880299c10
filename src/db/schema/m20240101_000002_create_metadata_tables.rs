use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum HdfsInodes {
    Table,
    Id,
    ParentId,
    Name,
    UserId,
    GroupId,
    Permission,
    Size,
    IsDir,
}

#[derive(DeriveIden)]
enum HdfsUsers {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum HdfsGroups {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum HdfsUsersGroups {
    Table,
    UserId,
    GroupId,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HdfsInodes::Table)
                    .if_not_exists()
                    // ids are assigned by the namesystem, never generated here
                    .col(
                        ColumnDef::new(HdfsInodes::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HdfsInodes::ParentId).big_integer().not_null())
                    .col(ColumnDef::new(HdfsInodes::Name).string().not_null())
                    .col(ColumnDef::new(HdfsInodes::UserId).integer().not_null())
                    .col(ColumnDef::new(HdfsInodes::GroupId).integer().not_null())
                    .col(ColumnDef::new(HdfsInodes::Permission).small_integer().not_null())
                    .col(
                        ColumnDef::new(HdfsInodes::Size)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(HdfsInodes::IsDir).boolean().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HdfsUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HdfsUsers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HdfsUsers::Name).string().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HdfsGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HdfsGroups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HdfsGroups::Name).string().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HdfsUsersGroups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(HdfsUsersGroups::UserId).integer().not_null())
                    .col(ColumnDef::new(HdfsUsersGroups::GroupId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(HdfsUsersGroups::UserId)
                            .col(HdfsUsersGroups::GroupId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HdfsUsersGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HdfsGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HdfsUsers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(HdfsInodes::Table).to_owned())
            .await?;
        Ok(())
    }
}
