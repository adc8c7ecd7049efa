//! Persistence for campaigns, recipients and transactions.
//!
//! [`CampaignStore`] is the only interface the engine uses. [`InMemoryStore`]
//! backs tests; [`SqliteStore`] is the durable backend.

pub mod sqlite_store;
pub mod store;

pub use sqlite_store::SqliteStore;
pub use store::{CampaignStore, InMemoryStore, StoreError};

use std::sync::Arc;

/// Open the backend named by a database URL; `memory` selects the in-process store
pub async fn open_store(database_url: &str) -> Result<Arc<dyn CampaignStore>, StoreError> {
    if database_url == "memory" {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::connect(database_url).await?))
}
