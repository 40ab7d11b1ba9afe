use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

/// Service status enum
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

/// Health check response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub service: String,
    pub version: String,
    pub broker: String,
    pub timestamp: DateTime<Utc>,
}

/// Health check endpoint; degraded when the store does not answer
///
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.store.ping().await {
        Ok(()) => ServiceStatus::Healthy,
        Err(e) => {
            warn!("Store health check failed: {}", e);
            ServiceStatus::Degraded
        }
    };

    Json(HealthResponse {
        status,
        service: "message-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        broker: state.publisher.broker_name().to_string(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn test_health_reports_store_and_broker() {
        let (state, _broker) = test_state().await;

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
        assert_eq!(health.service, "message-service");
        assert_eq!(health.broker, "in-memory");
    }
}
