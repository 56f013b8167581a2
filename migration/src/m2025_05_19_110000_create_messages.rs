//! Migration to create the messages table.
//!
//! Stores one row per inbound direct message. The unique index on
//! `platform_message_id` is the dedupe mechanism for webhook retries; the
//! composite `(tenant_id, platform_message_id)` index is the structural
//! fallback conflict target for deployments missing the single-column
//! constraint. NULL message ids are exempt from both.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Messages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Messages::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(Messages::PlatformMessageId)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(Messages::SenderId).text().not_null())
                    .col(ColumnDef::new(Messages::RecipientId).text().not_null())
                    .col(ColumnDef::new(Messages::Text).text().null())
                    .col(ColumnDef::new(Messages::Attachments).json_binary().null())
                    .col(ColumnDef::new(Messages::SenderName).text().null())
                    .col(ColumnDef::new(Messages::RecipientName).text().null())
                    .col(
                        ColumnDef::new(Messages::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Messages::RawEvent)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Messages::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_tenant_id")
                            .from(Messages::Table, Messages::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_platform_message_id")
                    .table(Messages::Table)
                    .col(Messages::PlatformMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_tenant_platform_message_id")
                    .table(Messages::Table)
                    .col(Messages::TenantId)
                    .col(Messages::PlatformMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_messages_tenant_occurred")
                    .table(Messages::Table)
                    .col(Messages::TenantId)
                    .col(Messages::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_platform_message_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_tenant_platform_message_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_messages_tenant_occurred").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    TenantId,
    PlatformMessageId,
    SenderId,
    RecipientId,
    Text,
    Attachments,
    SenderName,
    RecipientName,
    OccurredAt,
    RawEvent,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
