//! Migration to create the connection_databases table.
//!
//! Top level of the discovered schema: a database, base, spreadsheet, bucket or schema that a
//! connection exposes. Deleting a row removes its tables and columns through cascading keys.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectionDatabases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectionDatabases::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConnectionDatabases::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionDatabases::ExternalId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConnectionDatabases::Name).text().not_null())
                    .col(
                        ColumnDef::new(ConnectionDatabases::Metadata)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectionDatabases::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConnectionDatabases::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connection_databases_connection_id")
                            .from(ConnectionDatabases::Table, ConnectionDatabases::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_connection_databases_connection_external")
                    .table(ConnectionDatabases::Table)
                    .col(ConnectionDatabases::ConnectionId)
                    .col(ConnectionDatabases::ExternalId)
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
                    .name("uq_connection_databases_connection_external")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ConnectionDatabases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectionDatabases {
    Table,
    Id,
    ConnectionId,
    ExternalId,
    Name,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}
