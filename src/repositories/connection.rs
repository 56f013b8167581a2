//! Connection repository for database operations
//!
//! Lookup methods used by tenant resolution, plus the single write the
//! pipeline performs against connections: touching the `last_event_at`
//! marker after an event is attributed.

use anyhow::{Result, anyhow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::connection::{self, Entity as Connection};

/// Repository for connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds the connection bound to the given platform account id,
    /// preferring the most recently updated row when more than one matches.
    pub async fn find_most_recent_by_account(
        &self,
        platform_account_id: &str,
    ) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .filter(connection::Column::PlatformAccountId.eq(platform_account_id))
            .order_by_desc(connection::Column::UpdatedAt)
            .order_by_desc(connection::Column::Id)
            .one(&*self.db)
            .await?)
    }

    /// Finds the most recently updated connection regardless of account.
    ///
    /// Only valid for sentinel-tagged test events; callers enforce that
    /// policy.
    pub async fn find_any_most_recent(&self) -> Result<Option<connection::Model>> {
        Ok(Connection::find()
            .order_by_desc(connection::Column::UpdatedAt)
            .order_by_desc(connection::Column::Id)
            .one(&*self.db)
            .await?)
    }

    /// Records that a webhook event was attributed through this connection.
    ///
    /// Deliberately leaves `updated_at` untouched: resolution order and the
    /// sentinel fallback key off `updated_at`, and webhook traffic must not
    /// reshuffle them.
    pub async fn touch_last_event(&self, id: &Uuid) -> Result<connection::Model> {
        let existing = Connection::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Connection '{}' not found", id))?;

        let mut model: connection::ActiveModel = existing.into();
        model.last_event_at = Set(Some(chrono::Utc::now().into()));

        Ok(model.update(&*self.db).await?)
    }
}
