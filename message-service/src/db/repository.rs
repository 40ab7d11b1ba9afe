use tokio::sync::Mutex;
use tracing::{debug, info};

use shared::database::{
    close_connection, open_connection, run_migrations, test_connection, DatabaseConfig,
    DatabaseResult, DbConnection,
};

use crate::models::StoredMessage;

/// Durable message table behind a single connection.
///
/// Every statement takes the connection lock for its own duration only, so
/// writes never interleave and callers never hold the lock across other work.
pub struct MessageStore {
    conn: Mutex<DbConnection>,
}

impl MessageStore {
    /// Open the store and create the backing table if needed
    pub async fn open(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let mut conn = open_connection(config).await?;
        run_migrations(&mut conn).await?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one message and return its id
    pub async fn insert(&self, topic: &str, message: &str) -> DatabaseResult<i64> {
        let mut conn = self.conn.lock().await;

        let id = sqlx::query("INSERT INTO messages (topic, message) VALUES (?, ?)")
            .bind(topic)
            .bind(message)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        debug!("Stored message {} for topic {}", id, topic);
        Ok(id)
    }

    /// All messages for a topic in insertion order; empty when none match
    pub async fn list_by_topic(&self, topic: &str) -> DatabaseResult<Vec<StoredMessage>> {
        let mut conn = self.conn.lock().await;

        let messages = sqlx::query_as::<_, StoredMessage>(
            r#"
            SELECT id, topic, message FROM messages
            WHERE topic = ?
            ORDER BY id ASC
            "#,
        )
        .bind(topic)
        .fetch_all(&mut *conn)
        .await?;

        Ok(messages)
    }

    /// Remove every message for a topic and return how many were removed
    pub async fn delete_by_topic(&self, topic: &str) -> DatabaseResult<u64> {
        let mut conn = self.conn.lock().await;

        let removed = sqlx::query("DELETE FROM messages WHERE topic = ?")
            .bind(topic)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        info!("Deleted {} messages from topic {}", removed, topic);
        Ok(removed)
    }

    /// Check that the connection still answers queries
    pub async fn ping(&self) -> DatabaseResult<()> {
        let mut conn = self.conn.lock().await;
        test_connection(&mut *conn).await
    }

    /// Release the connection at shutdown
    pub async fn close(self) -> DatabaseResult<()> {
        close_connection(self.conn.into_inner()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn memory_store() -> MessageStore {
        MessageStore::open(&DatabaseConfig::in_memory()).await.unwrap()
    }

    fn bodies(messages: &[StoredMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = memory_store().await;

        let first = store.insert("orders", "order-1").await.unwrap();
        let second = store.insert("payments", "payment-1").await.unwrap();
        let third = store.insert("orders", "order-2").await.unwrap();

        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = memory_store().await;
        store.insert("orders", "order-1").await.unwrap();
        store.insert("payments", "payment-1").await.unwrap();
        store.insert("orders", "order-2").await.unwrap();
        store.insert("orders", "order-3").await.unwrap();

        let orders = store.list_by_topic("orders").await.unwrap();
        assert_eq!(bodies(&orders), vec!["order-1", "order-2", "order-3"]);
        assert!(orders.iter().all(|m| m.topic == "orders"));
    }

    #[tokio::test]
    async fn test_list_unknown_topic_is_empty() {
        let store = memory_store().await;
        assert!(store.list_by_topic("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_only_matching_topic() {
        let store = memory_store().await;
        store.insert("orders", "order-1").await.unwrap();
        store.insert("orders", "order-2").await.unwrap();
        store.insert("payments", "payment-1").await.unwrap();

        assert_eq!(store.delete_by_topic("orders").await.unwrap(), 2);
        assert!(store.list_by_topic("orders").await.unwrap().is_empty());
        assert_eq!(store.list_by_topic("payments").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_topic_removes_nothing() {
        let store = memory_store().await;
        assert_eq!(store.delete_by_topic("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = memory_store().await;
        let before = store.insert("orders", "order-1").await.unwrap();
        store.delete_by_topic("orders").await.unwrap();

        let after = store.insert("orders", "order-2").await.unwrap();
        assert!(after > before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_are_all_kept() {
        let store = Arc::new(memory_store().await);

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(&format!("topic-{}", i % 4), &format!("message-{}", i))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);

        let mut total = 0;
        for t in 0..4 {
            total += store.list_by_topic(&format!("topic-{}", t)).await.unwrap().len();
        }
        assert_eq!(total, 32);
    }

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("messages.db").display()),
            ..Default::default()
        };

        let store = MessageStore::open(&config).await.unwrap();
        store.insert("orders", "order-1").await.unwrap();
        store.close().await.unwrap();

        let reopened = MessageStore::open(&config).await.unwrap();
        let orders = reopened.list_by_topic("orders").await.unwrap();
        assert_eq!(bodies(&orders), vec!["order-1"]);
        tokio_test::assert_ok!(reopened.ping().await);
    }
}
