//! # Repositories
//!
//! Data access layer over the SeaORM entities. Each repository encapsulates
//! the queries one part of the pipeline needs, keeping SeaORM specifics out
//! of the business logic.

pub mod connection;
pub mod message;
pub mod sync_state;
pub mod unmatched_event;

pub use connection::ConnectionRepository;
pub use message::{MessageRepository, PersistOutcome};
pub use sync_state::SyncStateRepository;
pub use unmatched_event::UnmatchedEventRepository;
