//! # Data Models
//!
//! This module contains the SeaORM entity models used throughout the DM
//! ingestion service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod message;
pub mod sync_state;
pub mod tenant;
pub mod unmatched_event;

pub use connection::Entity as Connection;
pub use message::Entity as Message;
pub use sync_state::Entity as SyncState;
pub use tenant::Entity as Tenant;
pub use unmatched_event::Entity as UnmatchedEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "dm-ingest".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
