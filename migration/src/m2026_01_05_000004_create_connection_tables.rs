//! Migration to create the connection_tables table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectionTables::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectionTables::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConnectionTables::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionTables::DatabaseId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionTables::ExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConnectionTables::Name).text().not_null())
                    .col(
                        ColumnDef::new(ConnectionTables::Metadata)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionTables::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConnectionTables::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connection_tables_connection_id")
                            .from(ConnectionTables::Table, ConnectionTables::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connection_tables_database_id")
                            .from(ConnectionTables::Table, ConnectionTables::DatabaseId)
                            .to(ConnectionDatabases::Table, ConnectionDatabases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_connection_tables_database_external")
                    .table(ConnectionTables::Table)
                    .col(ConnectionTables::DatabaseId)
                    .col(ConnectionTables::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Webhook lookups match on the provider-side table id
        manager
            .create_index(
                Index::create()
                    .name("idx_connection_tables_external_id")
                    .table(ConnectionTables::Table)
                    .col(ConnectionTables::ExternalId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connection_tables_external_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("uq_connection_tables_database_external")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ConnectionTables::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectionTables {
    Table,
    Id,
    ConnectionId,
    DatabaseId,
    ExternalId,
    Name,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ConnectionDatabases {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}
