//! Unmatched event entity model
//!
//! Append-only quarantine rows for events that could not be fully processed.
//! Written by the pipeline, read only by operational triage tooling.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "unmatched_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Platform account id that failed to resolve (or whose event failed)
    pub platform_account_id: String,

    /// Platform message id, when the event carried one
    pub platform_message_id: Option<String>,

    /// Original raw event payload
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Human-readable failure reason
    pub reason: String,

    /// Timestamp when the event was quarantined
    pub captured_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
