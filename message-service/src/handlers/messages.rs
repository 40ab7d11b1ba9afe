use axum::{
    extract::{Path, State},
    response::Json,
};
use bytes::Bytes;
use serde_json::Value;
use tracing::info;

use crate::models::{MessagePayload, MessageWithTopic};
use crate::utils::errors::{ApiError, ApiResult};
use crate::AppState;

const PRODUCED: &str = "Message sent to Kafka successfully";
const UPDATED_SIMULATED: &str = "Message updated successfully (simulated)";
const DELETED: &str = "Messages deleted successfully";
const DELETED_SIMULATED: &str = "Messages deleted successfully (simulated)";

/// Decode the first JSON value of a request body regardless of its declared
/// content type; anything after that value is ignored
fn decode_payload(body: &Bytes) -> ApiResult<MessagePayload> {
    let value = serde_json::Deserializer::from_slice(body)
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| ApiError::InvalidPayload("empty request body".to_string()))??;

    MessagePayload::from_json(value).map_err(ApiError::InvalidPayload)
}

/// Store a message, then publish it to the broker
///
/// The work runs on its own task so a client that hangs up mid-publish
/// cannot leave a stored row without its publish attempt.
///
/// POST /produce
pub async fn produce_message(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let payload = decode_payload(&body)?;

    tokio::spawn(async move {
        let id = state
            .store
            .insert(&payload.topic, &payload.message)
            .await
            .map_err(ApiError::storage("Failed to send message to Kafka"))?;

        let receipt = state
            .publisher
            .publish(&payload.topic, payload.message.as_bytes())
            .await?;

        info!(
            id,
            topic = %payload.topic,
            delivered = receipt.delivered,
            failed = receipt.failed,
            flushed = receipt.flushed,
            "Produced message"
        );
        Ok::<_, ApiError>(())
    })
    .await
    .map_err(ApiError::Interrupted)??;

    Ok(Json(PRODUCED))
}

/// List stored messages for a topic, oldest first
///
/// GET /messages/:topic
pub async fn list_messages(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> ApiResult<Json<Vec<MessageWithTopic>>> {
    let messages = state
        .store
        .list_by_topic(&topic)
        .await
        .map_err(ApiError::storage("Failed to retrieve messages"))?;

    Ok(Json(messages.into_iter().map(MessageWithTopic::from).collect()))
}

/// Validate an update; an append-only log has nothing to change in place
///
/// PUT /messages/:topic
pub async fn update_message(
    Path(topic): Path<String>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let payload = decode_payload(&body)?;

    info!("Updating message in topic {}: {} (simulated)", topic, payload.message);
    Ok(Json(UPDATED_SIMULATED))
}

/// Remove stored messages for a topic; records already published stay on the broker
///
/// DELETE /messages/:topic
pub async fn delete_messages(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> ApiResult<Json<&'static str>> {
    let store = state.store.clone();
    let owned_topic = topic.clone();
    tokio::spawn(async move { store.delete_by_topic(&owned_topic).await })
        .await
        .map_err(ApiError::Interrupted)?
        .map_err(ApiError::storage("Failed to delete messages"))?;

    if state.publisher.capabilities().delete_records {
        return Ok(Json(DELETED));
    }

    info!("Deleting messages from topic {} (simulated)", topic);
    Ok(Json(DELETED_SIMULATED))
}
