//! Tenant resolution for inbound events.
//!
//! Maps a platform account id to the owning tenant through an ordered chain
//! of lookup strategies, executed by a single loop with a uniform signature.
//! Adding or reordering strategies is a data change, not a control-flow
//! change. Each strategy invocation is bounded by a timeout so a hung lookup
//! cannot stall the rest of a delivery; a timed-out or erroring strategy
//! degrades to "no match from this strategy" and the chain proceeds.
//!
//! Nothing in this module propagates errors past the resolution boundary:
//! the only outputs are "resolved" and "no match".

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sea_orm::DatabaseConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::repositories::{ConnectionRepository, SyncStateRepository};

/// One lookup strategy in the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Exact lookup in the connection directory, most recently updated wins
    ConnectionByAccount,
    /// Exact lookup in the secondary sync-state store (accounts whose
    /// canonical linkage survived a historical migration there)
    SyncStateByAccount,
    /// Most recently updated connection of any account. Restricted to
    /// sentinel-tagged test events: running it for a real unmatched id would
    /// attribute a customer's message to an arbitrary tenant.
    AnyRecentConnection,
}

impl ResolveStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResolveStrategy::ConnectionByAccount => "connection_by_account",
            ResolveStrategy::SyncStateByAccount => "sync_state_by_account",
            ResolveStrategy::AnyRecentConnection => "any_recent_connection",
        }
    }

    /// The ordered chain applicable to an event. First success wins.
    fn chain(is_test: bool) -> &'static [ResolveStrategy] {
        if is_test {
            &[
                ResolveStrategy::ConnectionByAccount,
                ResolveStrategy::SyncStateByAccount,
                ResolveStrategy::AnyRecentConnection,
            ]
        } else {
            &[
                ResolveStrategy::ConnectionByAccount,
                ResolveStrategy::SyncStateByAccount,
            ]
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    pub tenant_id: Uuid,
    /// Connection row the attribution went through, when one was involved
    pub connection_id: Option<Uuid>,
    pub strategy: ResolveStrategy,
}

/// Resolves platform account ids to tenants.
#[derive(Clone)]
pub struct TenantResolver {
    connections: ConnectionRepository,
    sync_states: SyncStateRepository,
    timeout: Duration,
}

impl TenantResolver {
    pub fn new(db: Arc<DatabaseConnection>, timeout: Duration) -> Self {
        Self {
            connections: ConnectionRepository::new(db.clone()),
            sync_states: SyncStateRepository::new(db),
            timeout,
        }
    }

    /// Resolves the tenant for an event, or returns `None` when every
    /// strategy failed. Never returns an error.
    pub async fn resolve(&self, platform_account_id: &str, is_test: bool) -> Option<ResolvedTenant> {
        for strategy in ResolveStrategy::chain(is_test) {
            let lookup = self.run_strategy(*strategy, platform_account_id);
            match tokio::time::timeout(self.timeout, lookup).await {
                Ok(Ok(Some(resolved))) => {
                    info!(
                        platform_account_id,
                        tenant_id = %resolved.tenant_id,
                        strategy = strategy.as_str(),
                        "Resolved tenant for event"
                    );
                    return Some(resolved);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(
                        platform_account_id,
                        strategy = strategy.as_str(),
                        error = ?e,
                        "Resolution strategy failed, trying next"
                    );
                }
                Err(_) => {
                    warn!(
                        platform_account_id,
                        strategy = strategy.as_str(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Resolution strategy timed out, trying next"
                    );
                }
            }
        }

        None
    }

    async fn run_strategy(
        &self,
        strategy: ResolveStrategy,
        platform_account_id: &str,
    ) -> Result<Option<ResolvedTenant>> {
        match strategy {
            ResolveStrategy::ConnectionByAccount => Ok(self
                .connections
                .find_most_recent_by_account(platform_account_id)
                .await?
                .map(|conn| ResolvedTenant {
                    tenant_id: conn.tenant_id,
                    connection_id: Some(conn.id),
                    strategy,
                })),
            ResolveStrategy::SyncStateByAccount => Ok(self
                .sync_states
                .find_most_recent_by_account(platform_account_id)
                .await?
                .map(|state| ResolvedTenant {
                    tenant_id: state.tenant_id,
                    connection_id: None,
                    strategy,
                })),
            ResolveStrategy::AnyRecentConnection => Ok(self
                .connections
                .find_any_most_recent()
                .await?
                .map(|conn| ResolvedTenant {
                    tenant_id: conn.tenant_id,
                    connection_id: Some(conn.id),
                    strategy,
                })),
        }
    }
}
