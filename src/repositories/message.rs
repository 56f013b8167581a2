//! Message repository for database operations
//!
//! Implements the idempotent persistence contract: exactly one stored row per
//! distinct platform message id, no matter how many times the platform
//! retries a delivery or how many workers race on it. Idempotency rests on
//! the store's unique constraints, not on any lock held by this process.

use anyhow::{Result, anyhow};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::message::{self, Entity as Message};
use crate::normalization::MessageEvent;

/// Outcome of an idempotent insert attempt.
///
/// `Duplicate` is a success: the message was already stored by an earlier or
/// concurrent delivery, and the pre-existing row is returned so enrichment
/// can still run against it.
#[derive(Debug, Clone)]
pub enum PersistOutcome {
    Inserted(message::Model),
    Duplicate(message::Model),
}

impl PersistOutcome {
    pub fn model(&self) -> &message::Model {
        match self {
            PersistOutcome::Inserted(m) | PersistOutcome::Duplicate(m) => m,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PersistOutcome::Duplicate(_))
    }
}

/// Repository for message database operations
#[derive(Debug, Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Creates a new MessageRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores the event for the given tenant, tolerating duplicate
    /// deliveries.
    ///
    /// The insert uses `platform_message_id` as its conflict target. A
    /// nothing-inserted result or a duplicate-key error both mean the row
    /// already exists and are returned as [`PersistOutcome::Duplicate`]. If
    /// the store rejects the single-column conflict target (a deployment
    /// whose schema only carries the composite constraint), the same insert
    /// is retried once with `(tenant_id, platform_message_id)` as the
    /// target. That retry is a structural fallback, not a retry on transient
    /// errors.
    ///
    /// Events without a platform message id carry no dedupe key and insert
    /// unconditionally.
    pub async fn insert_idempotent(
        &self,
        tenant_id: Uuid,
        event: &MessageEvent,
    ) -> Result<PersistOutcome> {
        let Some(mid) = event.platform_message_id.clone() else {
            let model = self.new_row(tenant_id, event).insert(&*self.db).await?;
            return Ok(PersistOutcome::Inserted(model));
        };

        let single = OnConflict::column(message::Column::PlatformMessageId)
            .do_nothing()
            .to_owned();

        match self.try_insert(tenant_id, event, &mid, single, false).await? {
            Some(outcome) => Ok(outcome),
            None => {
                // The single-column conflict target was rejected outright;
                // fall back to the composite key this schema does enforce.
                warn!(
                    platform_message_id = %mid,
                    "Single-column conflict target rejected, retrying with composite key"
                );
                let composite = OnConflict::columns([
                    message::Column::TenantId,
                    message::Column::PlatformMessageId,
                ])
                .do_nothing()
                .to_owned();

                self.try_insert(tenant_id, event, &mid, composite, true)
                    .await?
                    .ok_or_else(|| anyhow!("composite conflict target rejected for '{}'", mid))
            }
        }
    }

    /// One insert attempt with the given conflict target.
    ///
    /// Returns `Ok(None)` when the store rejected the conflict target itself,
    /// signalling the caller to fall back to the composite key. On the
    /// fallback attempt the genuine write error is surfaced instead, so the
    /// caller can quarantine the event with the real cause.
    async fn try_insert(
        &self,
        tenant_id: Uuid,
        event: &MessageEvent,
        mid: &str,
        on_conflict: OnConflict,
        is_fallback: bool,
    ) -> Result<Option<PersistOutcome>> {
        let insert = Message::insert(self.new_row(tenant_id, event))
            .on_conflict(on_conflict)
            .exec(&*self.db)
            .await;

        match insert {
            Ok(_) => {
                let model = self
                    .find_by_platform_message_id(mid)
                    .await?
                    .ok_or_else(|| anyhow!("message not persisted"))?;
                Ok(Some(PersistOutcome::Inserted(model)))
            }
            // DO NOTHING fired: the row already exists.
            Err(sea_orm::DbErr::RecordNotInserted) => {
                debug!(
                    platform_message_id = %mid,
                    "Duplicate delivery, message already stored"
                );
                let model = self
                    .find_by_platform_message_id(mid)
                    .await?
                    .ok_or_else(|| anyhow!("duplicate reported but row not found"))?;
                Ok(Some(PersistOutcome::Duplicate(model)))
            }
            // A unique index fired that was not the conflict target (e.g. the
            // composite index while targeting the single column). Still a
            // duplicate, still success.
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    platform_message_id = %mid,
                    "Unique violation on insert, message already stored"
                );
                let model = self
                    .find_by_platform_message_id(mid)
                    .await?
                    .ok_or_else(|| anyhow!("duplicate reported but row not found"))?;
                Ok(Some(PersistOutcome::Duplicate(model)))
            }
            Err(e) if !is_fallback => {
                debug!(error = ?e, "Insert attempt failed with non-duplicate error");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Finds a stored message by its platform message id.
    pub async fn find_by_platform_message_id(
        &self,
        platform_message_id: &str,
    ) -> Result<Option<message::Model>> {
        Ok(Message::find()
            .filter(message::Column::PlatformMessageId.eq(platform_message_id))
            .one(&*self.db)
            .await?)
    }

    /// Attaches enricher-resolved display names to a stored message.
    ///
    /// The only mutation this pipeline ever performs on a message row.
    pub async fn attach_profiles(
        &self,
        id: &Uuid,
        sender_name: Option<String>,
        recipient_name: Option<String>,
    ) -> Result<message::Model> {
        let existing = Message::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("Message '{}' not found", id))?;

        let mut model: message::ActiveModel = existing.into();
        if let Some(name) = sender_name {
            model.sender_name = Set(Some(name));
        }
        if let Some(name) = recipient_name {
            model.recipient_name = Set(Some(name));
        }
        model.updated_at = Set(chrono::Utc::now().into());

        Ok(model.update(&*self.db).await?)
    }

    fn new_row(&self, tenant_id: Uuid, event: &MessageEvent) -> message::ActiveModel {
        let now = chrono::Utc::now();
        message::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            platform_message_id: Set(event.platform_message_id.clone()),
            sender_id: Set(event.sender_id.clone()),
            recipient_id: Set(event.recipient_id.clone()),
            text: Set(event.text.clone()),
            attachments: Set(event.attachments.clone()),
            sender_name: Set(None),
            recipient_name: Set(None),
            occurred_at: Set(event.occurred_at.into()),
            raw_event: Set(event.raw.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}
