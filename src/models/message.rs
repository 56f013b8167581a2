//! Message entity model
//!
//! This module contains the SeaORM entity model for the messages table,
//! which stores one row per inbound direct message. Rows are created exactly
//! once per distinct `platform_message_id` and are only updated afterwards by
//! the enricher attaching resolved display names.

use super::tenant::Entity as Tenant;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Message entity representing a durably stored inbound direct message
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    /// Unique identifier for the message row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Tenant the message was attributed to
    pub tenant_id: Uuid,

    /// Platform-assigned message id; the dedupe key for webhook retries.
    /// NULL when the platform did not supply one.
    pub platform_message_id: Option<String>,

    /// Platform-side id of the sending user
    pub sender_id: String,

    /// Platform-side id of the receiving account
    pub recipient_id: String,

    /// Message text (absent for media-only messages)
    pub text: Option<String>,

    /// Opaque attachment payload as delivered by the platform
    #[sea_orm(column_type = "JsonBinary")]
    pub attachments: Option<JsonValue>,

    /// Display name of the sender, attached by the enricher
    pub sender_name: Option<String>,

    /// Display name of the recipient, attached by the enricher
    pub recipient_name: Option<String>,

    /// Timestamp when the message occurred on the platform
    pub occurred_at: DateTimeWithTimeZone,

    /// Original raw webhook event, retained for audit and replay
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_event: JsonValue,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Tenant",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id"
    )]
    Tenant,
}

impl Related<Tenant> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
