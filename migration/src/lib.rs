//! Database migrations for the DM ingestion service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_05_12_090100_create_tenants;
mod m2025_05_12_090200_create_connections;
mod m2025_05_12_090300_create_sync_states;
mod m2025_05_19_110000_create_messages;
mod m2025_05_19_110100_create_unmatched_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_12_090100_create_tenants::Migration),
            Box::new(m2025_05_12_090200_create_connections::Migration),
            Box::new(m2025_05_12_090300_create_sync_states::Migration),
            Box::new(m2025_05_19_110000_create_messages::Migration),
            Box::new(m2025_05_19_110100_create_unmatched_events::Migration),
        ]
    }
}
