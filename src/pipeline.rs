//! Per-event processing pipeline and the queued delivery handoff.
//!
//! One delivery carries zero or more normalized events; each event runs
//! through resolve → persist → enrich independently, so one bad event never
//! fails its siblings or the delivery. Events whose tenant cannot be
//! determined, and events whose write genuinely failed, land in quarantine
//! instead of being dropped.
//!
//! In `queued` mode the HTTP layer hands normalized events to a bounded mpsc
//! queue consumed by a single background worker task. Acceptance into the
//! queue is the delivery contract: an accepted job is processed unless the
//! process dies first, which the long-lived hosting model explicitly trades
//! for early acknowledgment.

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::enrichment::Enricher;
use crate::normalization::MessageEvent;
use crate::repositories::{
    ConnectionRepository, MessageRepository, UnmatchedEventRepository,
};
use crate::resolver::{ResolvedTenant, TenantResolver};

/// Reason string recorded when no strategy produced a tenant.
const REASON_NO_TENANT: &str = "no tenant matched platform account id";

/// The resolve → persist → enrich pipeline for normalized events.
#[derive(Clone)]
pub struct EventPipeline {
    resolver: TenantResolver,
    messages: MessageRepository,
    connections: ConnectionRepository,
    quarantine: UnmatchedEventRepository,
    enricher: Enricher,
}

impl EventPipeline {
    pub fn new(db: Arc<DatabaseConnection>, resolver: TenantResolver, enricher: Enricher) -> Self {
        Self {
            resolver,
            messages: MessageRepository::new(db.clone()),
            connections: ConnectionRepository::new(db.clone()),
            quarantine: UnmatchedEventRepository::new(db),
            enricher,
        }
    }

    /// Process every event of one delivery. Per-event failures are isolated;
    /// this function has no failure mode of its own.
    pub async fn process_delivery(&self, events: Vec<MessageEvent>) {
        for event in &events {
            self.process_event(event).await;
        }
    }

    /// Process a single event to completion.
    pub async fn process_event(&self, event: &MessageEvent) {
        match self
            .resolver
            .resolve(&event.platform_account_id, event.is_test)
            .await
        {
            Some(resolved) => self.persist_and_enrich(&resolved, event).await,
            None => {
                counter!("dm_ingest_events_quarantined_total").increment(1);
                self.record_quarantine(event, REASON_NO_TENANT).await;
            }
        }
    }

    async fn persist_and_enrich(&self, resolved: &ResolvedTenant, event: &MessageEvent) {
        // Best-effort side effect; attribution must not fail on it.
        if let Some(connection_id) = resolved.connection_id {
            if let Err(e) = self.connections.touch_last_event(&connection_id).await {
                warn!(
                    connection_id = %connection_id,
                    error = ?e,
                    "Failed to touch connection last_event_at"
                );
            }
        }

        match self.messages.insert_idempotent(resolved.tenant_id, event).await {
            Ok(outcome) => {
                if outcome.is_duplicate() {
                    counter!("dm_ingest_duplicate_deliveries_total").increment(1);
                } else {
                    counter!("dm_ingest_messages_stored_total").increment(1);
                }
                self.enricher.enrich(outcome.model()).await;
            }
            Err(e) => {
                counter!("dm_ingest_persistence_failures_total").increment(1);
                error!(
                    platform_message_id = ?event.platform_message_id,
                    tenant_id = %resolved.tenant_id,
                    error = ?e,
                    "Failed to persist message"
                );
                self.record_quarantine(event, &format!("persistence failed: {}", e))
                    .await;
            }
        }
    }

    /// Quarantine is a diagnostic path; its own failures are logged and
    /// never propagated.
    async fn record_quarantine(&self, event: &MessageEvent, reason: &str) {
        if let Err(e) = self
            .quarantine
            .record(
                &event.platform_account_id,
                event.platform_message_id.as_deref(),
                event.raw.clone(),
                reason,
            )
            .await
        {
            error!(
                platform_account_id = %event.platform_account_id,
                error = ?e,
                "Failed to write quarantine record"
            );
        }
    }
}

/// Job handed from the HTTP layer to the background worker in `queued` mode.
#[derive(Debug)]
pub struct DeliveryJob {
    pub events: Vec<MessageEvent>,
}

/// Spawns the background ingest worker and returns the queue handle.
///
/// The worker drains jobs until the shutdown token fires, then processes
/// whatever is already queued before exiting so cleanly-shut-down processes
/// do not drop accepted deliveries.
pub fn spawn_worker(
    pipeline: Arc<EventPipeline>,
    queue_depth: usize,
    shutdown: CancellationToken,
) -> mpsc::Sender<DeliveryJob> {
    let (tx, mut rx) = mpsc::channel::<DeliveryJob>(queue_depth);

    tokio::spawn(async move {
        info!("Ingest worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Ingest worker shutdown requested, draining queue");
                    while let Ok(job) = rx.try_recv() {
                        pipeline.process_delivery(job.events).await;
                    }
                    break;
                }
                job = rx.recv() => {
                    match job {
                        Some(job) => pipeline.process_delivery(job.events).await,
                        None => break,
                    }
                }
            }
        }
        info!("Ingest worker stopped");
    });

    tx
}
