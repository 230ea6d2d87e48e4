//! Admin API errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nodepool_client::ClientError;
use nodepool_pool::PoolError;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid path: {0}")]
    BadPath(String),

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// A forwarded CLI command failed; answered with its message.
    #[error("{0}")]
    Command(ClientError),

    /// A forwarded raw command failed; answered with the node's payload
    /// when there is one.
    #[error("{0}")]
    Rpc(ClientError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadPath(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Pool(PoolError::Client(e)) | Self::Client(e) => client_status(e),
            Self::Pool(e) if e.is_configuration() => StatusCode::NOT_FOUND,
            Self::Pool(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Command(_) => StatusCode::BAD_REQUEST,
            Self::Rpc(e) => match e.transport().and_then(|t| t.payload()) {
                Some(_) => StatusCode::BAD_REQUEST,
                None => client_status(e),
            },
        }
    }
}

fn client_status(e: &ClientError) -> StatusCode {
    match e {
        ClientError::BatchTooLarge { .. }
        | ClientError::FeeExceedsAmount { .. }
        | ClientError::InvalidFeeRate(_)
        | ClientError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "admin request failed");
        }

        let body: Value = match &self {
            Self::Rpc(e) => match e.transport().and_then(|t| t.payload()) {
                Some(payload) => payload.clone(),
                None => json!({ "error": self.to_string() }),
            },
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepool_client::TransportError;
    use nodepool_types::{NodeMode, NodeRole};
    use std::time::Duration;

    fn unavailable(source: TransportError) -> ClientError {
        ClientError::Unavailable {
            role: NodeRole::Dex,
            mode: NodeMode::Active,
            source,
        }
    }

    #[test]
    fn configuration_errors_are_not_found() {
        let err = ApiError::from(PoolError::NoClient {
            role: NodeRole::Dex,
            mode: NodeMode::Passive,
        });
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn timeouts_and_outages_are_unavailable() {
        let wait = ApiError::from(ClientError::WaitTimedOut { tx_id: "ab".into() });
        assert_eq!(wait.status(), StatusCode::SERVICE_UNAVAILABLE);
        let queue = ApiError::from(ClientError::Timeout(Duration::from_secs(65)));
        assert_eq!(queue.status(), StatusCode::SERVICE_UNAVAILABLE);
        let down = ApiError::from(PoolError::Client(unavailable(TransportError::Http(
            "refused".into(),
        ))));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rpc_failure_without_payload_falls_back_to_unavailable() {
        let err = ApiError::Rpc(unavailable(TransportError::Http("refused".into())));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::Rpc(unavailable(TransportError::Status {
            status: 500,
            body: json!({ "error": { "code": -5 } }),
        }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
