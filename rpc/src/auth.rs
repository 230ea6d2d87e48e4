//! Bearer-token access control for the admin API.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ApiError;
use crate::handlers::AdminState;

/// Reject requests that do not carry `Authorization: Bearer <token>`.
/// Without a configured token every request is rejected.
pub async fn require_admin(State(state): State<AdminState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match (state.token.as_deref(), presented) {
        (Some(expected), Some(given)) if !expected.is_empty() && token_matches(expected, given) => {
            next.run(req).await
        }
        _ => {
            warn!(path = %req.uri().path(), "rejected admin request");
            ApiError::Unauthorized.into_response()
        }
    }
}

/// Compare digests so timing reveals neither the token nor its length.
fn token_matches(expected: &str, given: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let given = Sha256::digest(given.as_bytes());
    expected.ct_eq(&given).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_exact_token_matches() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cret", "s3cre"));
        assert!(!token_matches("s3cret", "s3cret2"));
        assert!(!token_matches("s3cret", "S3CRET"));
        assert!(!token_matches("s3cret", ""));
    }
}
