//! JSON-RPC transport.
//!
//! [`RpcTransport`] is the seam between a [`NodeClient`](crate::NodeClient)
//! and the wire. [`HttpTransport`] speaks JSON-RPC 1.0 over HTTP with basic
//! auth, positional parameters only, which both Bitcoin Core and the ledger
//! chain's node accept. Tests swap in the in-memory transport from the
//! `nodepool-nullables` crate.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TransportError;

/// HTTP-level timeout for one request, kept under the call queue deadline.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Future returned by every transport call. Owns everything it needs so it
/// can sit in a [`CallQueue`](crate::CallQueue).
pub type RpcFuture = BoxFuture<'static, Result<Value, TransportError>>;

/// A node's JSON-RPC endpoint.
pub trait RpcTransport: Send + Sync + 'static {
    /// Invoke `method` with positional `params`, returning the reply's `result`.
    fn call(&self, method: &str, params: Vec<Value>) -> RpcFuture;

    /// Post an operator-supplied request body verbatim and return the node's
    /// reply body unchanged.
    fn post_raw(&self, body: String) -> RpcFuture;

    /// Endpoint URL, for logs.
    fn endpoint(&self) -> &str;
}

/// Basic-auth credential pair for the node's RPC server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCredentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for RpcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reply envelope shared by Bitcoin Core and the ledger node. The `error`
/// member is inspected separately so its raw form survives.
#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC over HTTP via `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    credentials: RpcCredentials,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, credentials: RpcCredentials) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(TransportError::from_reqwest)?;
        Ok(Self {
            http,
            url: url.into(),
            credentials,
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(&self.url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
    }
}

impl RpcTransport for HttpTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> RpcFuture {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": format!("nodepool-{id}"),
            "method": method,
            "params": params,
        });
        let request = self.request().json(&body);

        Box::pin(async move {
            let response = request.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(TransportError::from_reqwest)?;
            parse_reply(status.as_u16(), &bytes)
        })
    }

    fn post_raw(&self, body: String) -> RpcFuture {
        let request = self
            .request()
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);

        Box::pin(async move {
            let response = request.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(TransportError::from_reqwest)?;
            let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
                if status.is_success() {
                    TransportError::Decode(e.to_string())
                } else {
                    TransportError::Status {
                        status: status.as_u16(),
                        body: Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                    }
                }
            })?;
            match error_object(&value) {
                Some(err) => Err(TransportError::Rpc {
                    code: err.code,
                    message: err.message,
                    payload: value,
                }),
                None if !status.is_success() => Err(TransportError::Status {
                    status: status.as_u16(),
                    body: value,
                }),
                None => Ok(value),
            }
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Turn a raw HTTP reply into the call's `result`.
///
/// Bitcoin Core answers RPC-level failures with HTTP 500 and a JSON body, so
/// the body is inspected before the status.
pub(crate) fn parse_reply(status: u16, bytes: &[u8]) -> Result<Value, TransportError> {
    let success = (200..300).contains(&status);
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) if success => return Err(TransportError::Decode(e.to_string())),
        Err(_) => {
            return Err(TransportError::Status {
                status,
                body: Value::String(String::from_utf8_lossy(bytes).into_owned()),
            })
        }
    };

    if let Some(err) = error_object(&value) {
        return Err(TransportError::Rpc {
            code: err.code,
            message: err.message,
            payload: value,
        });
    }
    if !success {
        return Err(TransportError::Status {
            status,
            body: value,
        });
    }

    let reply: RpcReply =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(reply.result)
}

fn error_object(value: &Value) -> Option<RpcErrorObject> {
    match value.get("error") {
        None | Some(Value::Null) => None,
        Some(err) => Some(serde_json::from_value(err.clone()).unwrap_or(RpcErrorObject {
            code: 0,
            message: err.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_reply_yields_result() {
        let body = br#"{"result":{"blocks":10},"error":null,"id":"nodepool-1"}"#;
        let result = parse_reply(200, body).unwrap();
        assert_eq!(result["blocks"], 10);
    }

    #[test]
    fn rpc_error_keeps_payload() {
        let body = br#"{"result":null,"error":{"code":-5,"message":"Invalid or non-wallet transaction id"},"id":"x"}"#;
        let err = parse_reply(500, body).unwrap_err();
        match err {
            TransportError::Rpc { code, ref message, .. } => {
                assert_eq!(code, -5);
                assert!(message.contains("non-wallet"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.payload().unwrap()["error"]["code"], -5);
    }

    #[test]
    fn non_json_error_status_is_status_error() {
        let err = parse_reply(401, b"Unauthorized").unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 401, .. }));
    }

    #[test]
    fn garbled_success_body_is_decode_error() {
        let err = parse_reply(200, b"{\"result\": ").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = RpcCredentials {
            user: "rpc".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("rpc"));
        assert!(!printed.contains("hunter2"));
    }
}
