use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Broker, BrokerCapabilities, DeliveryReport, MessageResult};

/// Upper bound on how long a publish waits for outstanding deliveries
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Summary of one publish call, available once every delivery report was drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    pub delivered: usize,
    pub failed: usize,
    /// False when the flush timed out before all records were acknowledged
    pub flushed: bool,
}

/// Publishes single records, opening a fresh producer session for every call
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    flush_timeout: Duration,
}

impl Publisher {
    /// Create a new publisher over the given broker
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn broker_name(&self) -> &str {
        self.broker.name()
    }

    pub fn capabilities(&self) -> BrokerCapabilities {
        self.broker.capabilities()
    }

    /// Publish one record to `topic`.
    ///
    /// Only a failure to open the producer session is returned as an error.
    /// Enqueue errors, failed deliveries and flush timeouts are logged and
    /// reflected in the receipt.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> MessageResult<PublishReceipt> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut session = self.broker.open_session(events_tx).await.map_err(|e| {
            error!("Failed to open {} producer session: {}", self.broker.name(), e);
            e
        })?;

        let listener = spawn_delivery_listener(events_rx);

        if let Err(e) = session.send(topic, payload) {
            error!("Failed to enqueue message for topic {}: {}", topic, e);
        }

        let flushed = match session.flush(self.flush_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Flush for topic {} did not complete: {}", topic, e);
                false
            }
        };

        // Closing the session closes the event channel, which ends the listener
        session.close().await;

        let (delivered, failed) = match listener.await {
            Ok(counts) => counts,
            Err(e) => {
                error!("Delivery report listener for topic {} aborted: {}", topic, e);
                (0, 0)
            }
        };

        debug!(
            topic = %topic,
            delivered,
            failed,
            flushed,
            "Publish finished"
        );

        Ok(PublishReceipt {
            delivered,
            failed,
            flushed,
        })
    }
}

/// Drain delivery reports until the session closes, returning (delivered, failed)
fn spawn_delivery_listener(
    mut events: mpsc::UnboundedReceiver<DeliveryReport>,
) -> JoinHandle<(usize, usize)> {
    tokio::spawn(async move {
        let mut delivered = 0;
        let mut failed = 0;

        while let Some(report) = events.recv().await {
            match &report.error {
                None => {
                    delivered += 1;
                    info!(
                        "Delivered message to {} [{}] @ {}",
                        report.topic,
                        report.partition,
                        report.offset.unwrap_or(-1)
                    );
                }
                Some(reason) => {
                    failed += 1;
                    error!(
                        "Delivery failed: {} [{}]: {}",
                        report.topic, report.partition, reason
                    );
                }
            }
        }

        (delivered, failed)
    })
}
