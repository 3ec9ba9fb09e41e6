use std::sync::Arc;

use crate::config::RelayConfig;
use crate::registry::{LocalRegistry, RoomRegistry};
use crate::store::{MemoryStore, MessageStore, StoreError};

/// Shared application state, built once at start-up and handed to every session
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub registry: Arc<dyn RoomRegistry>,
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        registry: Arc<dyn RoomRegistry>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            store,
        }
    }

    /// In-memory registry and store
    pub fn in_memory(config: RelayConfig) -> Self {
        Self::new(
            config,
            Arc::new(LocalRegistry::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Create the configured seed users, skipping ones that already exist
    pub async fn seed_users(&self) {
        for username in &self.config.seed_users {
            match self.store.create_user(username).await {
                Ok(user) => tracing::info!("Seeded user {} ({})", user.username, user.id),
                Err(StoreError::DuplicateUser(_)) => {
                    tracing::debug!("Seed user {} already exists", username)
                }
                Err(e) => tracing::warn!("Failed to seed user {}: {}", username, e),
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(RelayConfig::default())
    }
}
