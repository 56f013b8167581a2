//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which maps platform account ids to the tenants that own them. The
//! ingestion pipeline reads this table during tenant resolution and only
//! mutates the `last_event_at` marker.

use super::tenant::Entity as Tenant;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Connection entity linking a platform account to a tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Tenant identifier for multi-tenancy
    pub tenant_id: Uuid,

    /// Platform-side account identifier this connection is bound to
    pub platform_account_id: String,

    /// Status of the connection (active|revoked|error)
    pub status: String,

    /// Display name for the connection (optional)
    pub display_name: Option<String>,

    /// Timestamp of the last webhook event attributed through this connection
    pub last_event_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
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
