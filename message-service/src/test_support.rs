use std::sync::Arc;

use shared::database::DatabaseConfig;
use shared::messaging::{InMemoryBroker, Publisher};

use crate::db::MessageStore;
use crate::AppState;

/// State over a fresh in-memory store and a healthy in-memory broker
pub async fn test_state() -> (AppState, InMemoryBroker) {
    test_state_with(InMemoryBroker::new()).await
}

/// State over a fresh in-memory store and the given broker
pub async fn test_state_with(broker: InMemoryBroker) -> (AppState, InMemoryBroker) {
    let store = MessageStore::open(&DatabaseConfig::in_memory())
        .await
        .expect("in-memory store");

    let state = AppState {
        store: Arc::new(store),
        publisher: Publisher::new(Arc::new(broker.clone())),
    };
    (state, broker)
}
