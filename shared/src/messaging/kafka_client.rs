/// Kafka producer backed by librdkafka.
///
/// Each session owns its own `BaseProducer`. Delivery callbacks fire while the
/// producer is polled (during flush) and are forwarded into the session's
/// delivery-report channel.
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};
use rdkafka::ClientContext;
use tracing::{debug, warn};

use super::{Broker, DeliveryReport, DeliverySender, MessageError, MessageResult, ProducerSession};

/// Kafka client configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub message_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "message-service".to_string(),
            message_timeout_ms: 30_000,
        }
    }
}

impl KafkaConfig {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("message.timeout.ms", self.message_timeout_ms.to_string());
        config
    }
}

/// Producer context forwarding delivery callbacks into a channel
struct DeliveryForwarder {
    events: DeliverySender,
}

impl ClientContext for DeliveryForwarder {}

impl ProducerContext for DeliveryForwarder {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => {
                DeliveryReport::delivered(message.topic(), message.partition(), message.offset())
            }
            Err((err, message)) => {
                DeliveryReport::failed(message.topic(), message.partition(), err.to_string())
            }
        };

        let _ = self.events.send(report);
    }
}

/// Kafka broker; holds configuration only, connections live inside sessions
pub struct KafkaBroker {
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Broker for KafkaBroker {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn open_session(&self, events: DeliverySender) -> MessageResult<Box<dyn ProducerSession>> {
        let producer: BaseProducer<DeliveryForwarder> = self
            .config
            .client_config()
            .create_with_context(DeliveryForwarder { events })
            .map_err(|e| MessageError::Connection(e.to_string()))?;

        debug!(
            "Opened Kafka producer session against {}",
            self.config.bootstrap_servers
        );

        Ok(Box::new(KafkaSession {
            producer: Arc::new(producer),
        }))
    }
}

struct KafkaSession {
    producer: Arc<BaseProducer<DeliveryForwarder>>,
}

#[async_trait::async_trait]
impl ProducerSession for KafkaSession {
    fn send(&mut self, topic: &str, payload: &[u8]) -> MessageResult<()> {
        self.producer
            .send(BaseRecord::<(), [u8]>::to(topic).payload(payload))
            .map_err(|(err, _record)| MessageError::Enqueue(err.to_string()))
    }

    async fn flush(&mut self, timeout: Duration) -> MessageResult<()> {
        let producer = self.producer.clone();
        let result = tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| MessageError::Connection(format!("flush task failed: {}", e)))?;

        match result {
            Ok(()) => Ok(()),
            Err(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)) => {
                Err(MessageError::FlushTimeout(timeout))
            }
            Err(e) => Err(MessageError::Connection(e.to_string())),
        }
    }

    async fn close(self: Box<Self>) {
        let producer = self.producer;
        // Dropping the producer purges what is left and releases the delivery channel
        if let Err(e) = tokio::task::spawn_blocking(move || drop(producer)).await {
            warn!("Kafka producer teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.bootstrap_servers, "localhost:9092");
        assert_eq!(config.client_id, "message-service");
    }

    #[test]
    fn test_client_config_values() {
        let config = KafkaConfig {
            bootstrap_servers: "broker-1:9092,broker-2:9092".to_string(),
            client_id: "test".to_string(),
            message_timeout_ms: 5_000,
        };

        let client_config = config.client_config();
        assert_eq!(
            client_config.get("bootstrap.servers"),
            Some("broker-1:9092,broker-2:9092")
        );
        assert_eq!(client_config.get("message.timeout.ms"), Some("5000"));
    }
}
