//! Migration to create the job queues.
//!
//! `metadata_sync_jobs` drive schema discovery for a connection, `data_sync_jobs` drive a sync
//! run. Both share the pending -> processing -> completed/failed lifecycle and are polled oldest
//! first by status.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MetadataSyncJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MetadataSyncJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MetadataSyncJobs::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetadataSyncJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(MetadataSyncJobs::Message).text().null())
                    .col(
                        ColumnDef::new(MetadataSyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MetadataSyncJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MetadataSyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MetadataSyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_metadata_sync_jobs_connection_id")
                            .from(MetadataSyncJobs::Table, MetadataSyncJobs::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_metadata_sync_jobs_status_created")
                    .table(MetadataSyncJobs::Table)
                    .col(MetadataSyncJobs::Status)
                    .col(MetadataSyncJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DataSyncJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataSyncJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataSyncJobs::SyncId).uuid().not_null())
                    .col(
                        ColumnDef::new(DataSyncJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(DataSyncJobs::Trigger)
                            .text()
                            .not_null()
                            .default("schedule"),
                    )
                    .col(ColumnDef::new(DataSyncJobs::Payload).json_binary().null())
                    .col(ColumnDef::new(DataSyncJobs::Message).text().null())
                    .col(
                        ColumnDef::new(DataSyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DataSyncJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DataSyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DataSyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_data_sync_jobs_sync_id")
                            .from(DataSyncJobs::Table, DataSyncJobs::SyncId)
                            .to(Syncs::Table, Syncs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_data_sync_jobs_status_created")
                    .table(DataSyncJobs::Table)
                    .col(DataSyncJobs::Status)
                    .col(DataSyncJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_data_sync_jobs_status_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(DataSyncJobs::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_metadata_sync_jobs_status_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(MetadataSyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MetadataSyncJobs {
    Table,
    Id,
    ConnectionId,
    Status,
    Message,
    StartedAt,
    FinishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DataSyncJobs {
    Table,
    Id,
    SyncId,
    Status,
    Trigger,
    Payload,
    Message,
    StartedAt,
    FinishedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Syncs {
    Table,
    Id,
}
