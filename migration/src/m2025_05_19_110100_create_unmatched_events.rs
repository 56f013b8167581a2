//! Migration to create the unmatched_events table.
//!
//! Append-only quarantine for events that could not be attributed to a
//! tenant or failed to persist. Consumed by operational triage tooling, not
//! by the ingestion pipeline itself.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UnmatchedEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UnmatchedEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::PlatformAccountId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::PlatformMessageId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UnmatchedEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UnmatchedEvents::Reason).text().not_null())
                    .col(
                        ColumnDef::new(UnmatchedEvents::CapturedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_unmatched_events_account_captured")
                    .table(UnmatchedEvents::Table)
                    .col(UnmatchedEvents::PlatformAccountId)
                    .col(UnmatchedEvents::CapturedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_unmatched_events_account_captured")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UnmatchedEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UnmatchedEvents {
    Table,
    Id,
    PlatformAccountId,
    PlatformMessageId,
    Payload,
    Reason,
    CapturedAt,
}
