//! Migration to create the connection_columns table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectionColumns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectionColumns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConnectionColumns::TableId).uuid().not_null())
                    .col(ColumnDef::new(ConnectionColumns::Name).text().not_null())
                    .col(ColumnDef::new(ConnectionColumns::DataType).text().not_null())
                    .col(
                        ColumnDef::new(ConnectionColumns::IsNullable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ConnectionColumns::IsPrimaryKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ConnectionColumns::OrdinalPosition)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ConnectionColumns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConnectionColumns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connection_columns_table_id")
                            .from(ConnectionColumns::Table, ConnectionColumns::TableId)
                            .to(ConnectionTables::Table, ConnectionTables::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_connection_columns_table_name")
                    .table(ConnectionColumns::Table)
                    .col(ConnectionColumns::TableId)
                    .col(ConnectionColumns::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uq_connection_columns_table_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ConnectionColumns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectionColumns {
    Table,
    Id,
    TableId,
    Name,
    DataType,
    IsNullable,
    IsPrimaryKey,
    OrdinalPosition,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ConnectionTables {
    Table,
    Id,
}
