//! Unmatched event repository for database operations
//!
//! Append-only quarantine sink. This pipeline only writes here; a separate
//! operational triage workflow reads it.

use anyhow::Result;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::unmatched_event;

/// Repository for quarantine writes
#[derive(Debug, Clone)]
pub struct UnmatchedEventRepository {
    db: Arc<DatabaseConnection>,
}

impl UnmatchedEventRepository {
    /// Creates a new UnmatchedEventRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one quarantine row.
    pub async fn record(
        &self,
        platform_account_id: &str,
        platform_message_id: Option<&str>,
        payload: JsonValue,
        reason: &str,
    ) -> Result<unmatched_event::Model> {
        let row = unmatched_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            platform_account_id: Set(platform_account_id.to_string()),
            platform_message_id: Set(platform_message_id.map(|s| s.to_string())),
            payload: Set(payload),
            reason: Set(reason.to_string()),
            captured_at: Set(chrono::Utc::now().into()),
        };

        Ok(row.insert(&*self.db).await?)
    }
}
