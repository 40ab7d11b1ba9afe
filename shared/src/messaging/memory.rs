//! In-process append log implementing [`Broker`].
//!
//! Records only become visible once a session is flushed, matching the way a
//! real producer batches and acknowledges writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use super::{Broker, DeliveryReport, DeliverySender, MessageError, MessageResult, ProducerSession};

/// A record accepted by the in-memory log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Healthy,
    Offline,
    Rejecting,
    Slow(Duration),
}

#[derive(Debug, Default)]
struct Log {
    records: Vec<BrokerRecord>,
    next_offsets: HashMap<String, i64>,
}

/// In-memory broker used by tests and by builds without a Kafka client
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    mode: Mode,
    log: Arc<Mutex<Log>>,
    sessions_opened: Arc<AtomicUsize>,
    flushes_completed: Arc<AtomicUsize>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Broker that acknowledges every record
    pub fn new() -> Self {
        Self::with_mode(Mode::Healthy)
    }

    /// Broker that cannot be reached; opening a session fails
    pub fn offline() -> Self {
        Self::with_mode(Mode::Offline)
    }

    /// Broker that accepts sessions but reports every delivery as failed
    pub fn rejecting() -> Self {
        Self::with_mode(Mode::Rejecting)
    }

    /// Broker that takes `ack_delay` to acknowledge a flush.
    ///
    /// A flush whose timeout is shorter than the delay gives up with
    /// [`MessageError::FlushTimeout`] and leaves its records unacknowledged.
    pub fn slow(ack_delay: Duration) -> Self {
        Self::with_mode(Mode::Slow(ack_delay))
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            log: Arc::new(Mutex::new(Log::default())),
            sessions_opened: Arc::new(AtomicUsize::new(0)),
            flushes_completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Snapshot of every acknowledged record, in append order
    pub async fn records(&self) -> Vec<BrokerRecord> {
        self.log.lock().await.records.clone()
    }

    /// Acknowledged records for one topic
    pub async fn records_for(&self, topic: &str) -> Vec<BrokerRecord> {
        self.log
            .lock()
            .await
            .records
            .iter()
            .filter(|record| record.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of producer sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Number of flushes that ran to completion
    pub fn flushes_completed(&self) -> usize {
        self.flushes_completed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Broker for InMemoryBroker {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn open_session(&self, events: DeliverySender) -> MessageResult<Box<dyn ProducerSession>> {
        if self.mode == Mode::Offline {
            return Err(MessageError::Connection(
                "in-memory broker is offline".to_string(),
            ));
        }

        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySession {
            mode: self.mode,
            log: self.log.clone(),
            flushes_completed: self.flushes_completed.clone(),
            pending: Vec::new(),
            events,
        }))
    }
}

struct InMemorySession {
    mode: Mode,
    log: Arc<Mutex<Log>>,
    flushes_completed: Arc<AtomicUsize>,
    pending: Vec<(String, Vec<u8>)>,
    events: DeliverySender,
}

#[async_trait::async_trait]
impl ProducerSession for InMemorySession {
    fn send(&mut self, topic: &str, payload: &[u8]) -> MessageResult<()> {
        self.pending.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn flush(&mut self, timeout: Duration) -> MessageResult<()> {
        if let Mode::Slow(ack_delay) = self.mode {
            if ack_delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(MessageError::FlushTimeout(timeout));
            }
            tokio::time::sleep(ack_delay).await;
        }

        let mut log = self.log.lock().await;

        for (topic, payload) in self.pending.drain(..) {
            let report = match self.mode {
                Mode::Rejecting => DeliveryReport::failed(&topic, -1, "delivery rejected by broker"),
                _ => {
                    let next = log.next_offsets.entry(topic.clone()).or_insert(0);
                    let offset = *next;
                    *next += 1;

                    log.records.push(BrokerRecord {
                        topic: topic.clone(),
                        partition: 0,
                        offset,
                        payload,
                    });
                    DeliveryReport::delivered(&topic, 0, offset)
                }
            };

            // The listener may already be gone; the record outcome stands either way
            let _ = self.events.send(report);
        }

        self.flushes_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) {
        if !self.pending.is_empty() {
            debug!("Dropping {} unflushed records", self.pending.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_records_visible_after_flush() {
        let broker = InMemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = broker.open_session(tx).await.unwrap();
        session.send("orders", b"order-1").unwrap();
        assert!(broker.records().await.is_empty());

        session.flush(Duration::from_secs(1)).await.unwrap();
        session.close().await;

        assert_eq!(rx.recv().await, Some(DeliveryReport::delivered("orders", 0, 0)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(
            broker.records().await,
            vec![BrokerRecord {
                topic: "orders".to_string(),
                partition: 0,
                offset: 0,
                payload: b"order-1".to_vec(),
            }]
        );
    }

    #[tokio::test]
    async fn test_offsets_are_per_topic() {
        let broker = InMemoryBroker::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut session = broker.open_session(tx).await.unwrap();
        session.send("orders", b"a").unwrap();
        session.send("payments", b"b").unwrap();
        session.send("orders", b"c").unwrap();
        session.flush(Duration::from_secs(1)).await.unwrap();

        let offsets: Vec<i64> = broker
            .records_for("orders")
            .await
            .iter()
            .map(|record| record.offset)
            .collect();
        assert_eq!(offsets, vec![0, 1]);
        assert_eq!(broker.records_for("payments").await[0].offset, 0);
    }

    #[tokio::test]
    async fn test_offline_broker_refuses_sessions() {
        let broker = InMemoryBroker::offline();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = broker.open_session(tx).await;
        assert!(matches!(result, Err(MessageError::Connection(_))));
        assert_eq!(broker.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_rejecting_broker_reports_failures() {
        let broker = InMemoryBroker::rejecting();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = broker.open_session(tx).await.unwrap();
        session.send("orders", b"order-1").unwrap();
        session.flush(Duration::from_secs(1)).await.unwrap();

        let report = rx.recv().await.unwrap();
        assert!(!report.is_success());
        assert!(broker.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_broker_acks_within_timeout() {
        let broker = InMemoryBroker::slow(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = broker.open_session(tx).await.unwrap();
        session.send("orders", b"order-1").unwrap();
        session.flush(Duration::from_secs(1)).await.unwrap();
        session.close().await;

        assert_eq!(rx.recv().await, Some(DeliveryReport::delivered("orders", 0, 0)));
        assert_eq!(broker.flushes_completed(), 1);
    }

    #[tokio::test]
    async fn test_slow_broker_times_out_without_acks() {
        let broker = InMemoryBroker::slow(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut session = broker.open_session(tx).await.unwrap();
        session.send("orders", b"order-1").unwrap();

        let timeout = Duration::from_millis(30);
        let result = session.flush(timeout).await;
        assert!(matches!(result, Err(MessageError::FlushTimeout(t)) if t == timeout));

        session.close().await;
        assert_eq!(rx.recv().await, None);
        assert!(broker.records().await.is_empty());
        assert_eq!(broker.flushes_completed(), 0);
    }
}
