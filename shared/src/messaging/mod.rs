/// Broker abstraction and the per-call publisher built on top of it
pub mod memory;
pub mod publisher;

#[cfg(feature = "kafka")]
pub mod kafka_client;

pub use memory::{BrokerRecord, InMemoryBroker};
pub use publisher::{PublishReceipt, Publisher, DEFAULT_FLUSH_TIMEOUT};

#[cfg(feature = "kafka")]
pub use kafka_client::{KafkaBroker, KafkaConfig};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender half of the delivery-report channel handed to a producer session
pub type DeliverySender = mpsc::UnboundedSender<DeliveryReport>;

/// Outcome of a single record as reported by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn delivered(topic: &str, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset: Some(offset),
            error: None,
        }
    }

    pub fn failed(topic: &str, partition: i32, error: impl Into<String>) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Mutations a broker can apply to records it has already accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerCapabilities {
    pub update_records: bool,
    pub delete_records: bool,
}

impl BrokerCapabilities {
    /// An append-only log: records can be added but never changed or removed
    pub const APPEND_ONLY: Self = Self {
        update_records: false,
        delete_records: false,
    };
}

/// A message broker that hands out short-lived producer sessions
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Human readable backend name, used in logs and health output
    fn name(&self) -> &str;

    /// What the backend can do beyond appending
    fn capabilities(&self) -> BrokerCapabilities {
        BrokerCapabilities::APPEND_ONLY
    }

    /// Open a fresh producer session whose delivery reports go to `events`.
    ///
    /// The session owns `events`; the channel closes once the session is closed.
    async fn open_session(&self, events: DeliverySender) -> MessageResult<Box<dyn ProducerSession>>;
}

/// A producer session scoped to one publish call
#[async_trait::async_trait]
pub trait ProducerSession: Send {
    /// Enqueue one record for `topic`; the broker picks the partition
    fn send(&mut self, topic: &str, payload: &[u8]) -> MessageResult<()>;

    /// Wait until outstanding records are acknowledged or `timeout` elapses
    async fn flush(&mut self, timeout: Duration) -> MessageResult<()>;

    /// Tear the session down, closing its delivery-report channel
    async fn close(self: Box<Self>);
}

/// Message queue errors
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Enqueue error: {0}")]
    Enqueue(String),

    #[error("Flush timed out after {0:?}")]
    FlushTimeout(Duration),
}

pub type MessageResult<T> = Result<T, MessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_report_success() {
        let report = DeliveryReport::delivered("orders", 0, 7);
        assert!(report.is_success());
        assert_eq!(report.offset, Some(7));
    }

    #[test]
    fn test_delivery_report_failure() {
        let report = DeliveryReport::failed("orders", -1, "broker unreachable");
        assert!(!report.is_success());
        assert_eq!(report.offset, None);
        assert_eq!(report.error.as_deref(), Some("broker unreachable"));
    }

    #[test]
    fn test_append_only_capabilities() {
        let caps = BrokerCapabilities::APPEND_ONLY;
        assert!(!caps.update_records);
        assert!(!caps.delete_records);
        assert_eq!(caps, BrokerCapabilities::default());
    }
}
