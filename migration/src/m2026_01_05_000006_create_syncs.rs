//! Migration to create the syncs table.
//!
//! A sync maps a source connection table onto a destination connection table. Field mappings,
//! filters and direction are kept together in `table_mappings`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Syncs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Syncs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Syncs::TeamId).uuid().not_null())
                    .col(ColumnDef::new(Syncs::Name).text().not_null())
                    .col(ColumnDef::new(Syncs::SourceConnectionId).uuid().null())
                    .col(ColumnDef::new(Syncs::DestinationConnectionId).uuid().null())
                    .col(ColumnDef::new(Syncs::SourceTableId).uuid().null())
                    .col(ColumnDef::new(Syncs::DestinationTableId).uuid().null())
                    .col(ColumnDef::new(Syncs::TableMappings).json_binary().null())
                    .col(ColumnDef::new(Syncs::Schedule).text().null())
                    .col(
                        ColumnDef::new(Syncs::ConflictResolution)
                            .text()
                            .not_null()
                            .default("source_wins"),
                    )
                    .col(
                        ColumnDef::new(Syncs::Stage)
                            .text()
                            .not_null()
                            .default("accounts"),
                    )
                    .col(
                        ColumnDef::new(Syncs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Syncs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_syncs_source_connection_id")
                            .from(Syncs::Table, Syncs::SourceConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_syncs_destination_connection_id")
                            .from(Syncs::Table, Syncs::DestinationConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_syncs_source_table_id")
                            .from(Syncs::Table, Syncs::SourceTableId)
                            .to(ConnectionTables::Table, ConnectionTables::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_syncs_destination_table_id")
                            .from(Syncs::Table, Syncs::DestinationTableId)
                            .to(ConnectionTables::Table, ConnectionTables::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_syncs_source_table_id")
                    .table(Syncs::Table)
                    .col(Syncs::SourceTableId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_syncs_destination_table_id")
                    .table(Syncs::Table)
                    .col(Syncs::DestinationTableId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_syncs_destination_table_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_syncs_source_table_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Syncs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Syncs {
    Table,
    Id,
    TeamId,
    Name,
    SourceConnectionId,
    DestinationConnectionId,
    SourceTableId,
    DestinationTableId,
    TableMappings,
    Schedule,
    ConflictResolution,
    Stage,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum ConnectionTables {
    Table,
    Id,
}
