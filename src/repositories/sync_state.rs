//! Sync state repository for database operations
//!
//! Exact account lookups against the secondary linkage table; consulted by
//! tenant resolution when the connections table has no match.

use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;

use crate::models::sync_state::{self, Entity as SyncState};

/// Repository for sync state database operations
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncStateRepository {
    /// Creates a new SyncStateRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds the sync state row for the given platform account id, preferring
    /// the most recently updated row when more than one matches.
    pub async fn find_most_recent_by_account(
        &self,
        platform_account_id: &str,
    ) -> Result<Option<sync_state::Model>> {
        Ok(SyncState::find()
            .filter(sync_state::Column::PlatformAccountId.eq(platform_account_id))
            .order_by_desc(sync_state::Column::UpdatedAt)
            .order_by_desc(sync_state::Column::Id)
            .one(&*self.db)
            .await?)
    }
}
