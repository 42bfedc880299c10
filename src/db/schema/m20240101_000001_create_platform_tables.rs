use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Project {
    Table,
    Id,
    Projectname,
    Username,
    Created,
    Deleted,
    Description,
    DockerImage,
    PythonVersion,
    CondaEnv,
}

#[derive(DeriveIden)]
enum Dataset {
    Table,
    Id,
    #[sea_orm(iden = "projectId")]
    ProjectId,
    InodeName,
    InodeId,
    PublicDs,
    Permission,
    Dstype,
    Description,
    Searchable,
}

#[derive(DeriveIden)]
enum DatasetSharedWith {
    Table,
    Id,
    Dataset,
    Project,
    Accepted,
    SharedOn,
    Permission,
}

#[derive(DeriveIden)]
enum ProjectTeam {
    Table,
    ProjectId,
    TeamMember,
    TeamRole,
    Added,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Uid,
    Username,
    Email,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    Name,
    ProjectId,
    Type,
    JsonConfig,
}

#[derive(DeriveIden)]
enum Executions {
    Table,
    Id,
    JobId,
    Args,
}

#[derive(DeriveIden)]
enum JupyterSettings {
    Table,
    ProjectId,
    TeamMember,
    DockerConfig,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Project::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Project::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Project::Projectname).string().not_null())
                    .col(ColumnDef::new(Project::Username).string().not_null())
                    .col(ColumnDef::new(Project::Created).date_time())
                    .col(ColumnDef::new(Project::Deleted).boolean())
                    .col(ColumnDef::new(Project::Description).text())
                    .col(ColumnDef::new(Project::DockerImage).string())
                    .col(ColumnDef::new(Project::PythonVersion).string())
                    .col(
                        ColumnDef::new(Project::CondaEnv)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Dataset::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Dataset::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Dataset::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Dataset::InodeName).string().not_null())
                    .col(ColumnDef::new(Dataset::InodeId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Dataset::PublicDs)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Dataset::Permission).string().not_null())
                    .col(
                        ColumnDef::new(Dataset::Dstype)
                            .string()
                            .not_null()
                            .default("DATASET"),
                    )
                    .col(ColumnDef::new(Dataset::Description).text())
                    .col(ColumnDef::new(Dataset::Searchable).boolean())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DatasetSharedWith::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DatasetSharedWith::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DatasetSharedWith::Dataset).integer().not_null())
                    .col(ColumnDef::new(DatasetSharedWith::Project).integer().not_null())
                    .col(ColumnDef::new(DatasetSharedWith::Accepted).boolean().not_null())
                    .col(ColumnDef::new(DatasetSharedWith::SharedOn).date_time())
                    .col(ColumnDef::new(DatasetSharedWith::Permission).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProjectTeam::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ProjectTeam::ProjectId).integer().not_null())
                    .col(ColumnDef::new(ProjectTeam::TeamMember).string().not_null())
                    .col(ColumnDef::new(ProjectTeam::TeamRole).string().not_null())
                    .col(ColumnDef::new(ProjectTeam::Added).date_time())
                    .primary_key(
                        Index::create()
                            .col(ProjectTeam::ProjectId)
                            .col(ProjectTeam::TeamMember),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Uid)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Jobs::Name).string().not_null())
                    .col(ColumnDef::new(Jobs::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Jobs::Type).string().not_null())
                    .col(ColumnDef::new(Jobs::JsonConfig).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Executions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Executions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Executions::JobId).integer().not_null())
                    .col(ColumnDef::new(Executions::Args).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JupyterSettings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JupyterSettings::ProjectId).integer().not_null())
                    .col(ColumnDef::new(JupyterSettings::TeamMember).string().not_null())
                    .col(ColumnDef::new(JupyterSettings::DockerConfig).text())
                    .primary_key(
                        Index::create()
                            .col(JupyterSettings::ProjectId)
                            .col(JupyterSettings::TeamMember),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JupyterSettings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Executions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProjectTeam::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DatasetSharedWith::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Dataset::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Project::Table).to_owned())
            .await?;
        Ok(())
    }
}
