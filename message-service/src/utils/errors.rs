use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use shared::database::DatabaseError;
use shared::messaging::MessageError;
use tracing::error;

/// Errors a handler can end in, each mapped to one HTTP status
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body is not well-formed JSON of the expected shape; carries the reason for the log
    #[error("Invalid request payload")]
    InvalidPayload(String),

    /// The store rejected a statement; `context` is the client-facing message
    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// No producer session could be opened
    #[error("Failed to send message to Kafka")]
    Publish(#[source] MessageError),

    /// The detached task doing the request's work panicked or was cancelled
    #[error("Internal server error")]
    Interrupted(#[source] tokio::task::JoinError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn storage(context: &'static str) -> impl FnOnce(DatabaseError) -> ApiError {
        move |source| ApiError::Storage { context, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage { .. } | ApiError::Publish(_) | ApiError::Interrupted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        match &self {
            ApiError::InvalidPayload(reason) => tracing::warn!("Rejected request body: {}", reason),
            ApiError::Storage { context, source } => error!("{}: {}", context, source),
            ApiError::Publish(e) => error!("Failed to publish message: {}", e),
            ApiError::Interrupted(e) => error!("Request task did not finish: {}", e),
        }

        let error_response = json!({
            "success": false,
            "error": self.to_string(),
            "data": serde_json::Value::Null
        });

        (status, Json(error_response)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidPayload(err.to_string())
    }
}

impl From<MessageError> for ApiError {
    fn from(err: MessageError) -> Self {
        ApiError::Publish(err)
    }
}
