//! Backing store for CrossChat.
//!
//! This crate provides:
//! - The channel registration collection, keyed by channel id
//! - Relay events, unique by inbound platform message id
//! - Delivery records keyed by (cc_id, destination) with a cc_id index
//! - In-memory and SQLite implementations

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{DeliveryStore, RegistrationStore, RelayEventStore, Store};

use std::sync::Arc;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Open the store named by a database url (a file path or `:memory:`).
pub async fn open(database_url: &str) -> Result<Arc<dyn Store>> {
    let store = SqliteStore::connect(database_url).await?;
    Ok(Arc::new(store))
}
