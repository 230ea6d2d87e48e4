//! Nullable JSON-RPC transport: scripted replies, recorded calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nodepool_client::{RpcFuture, RpcTransport, TransportError};
use serde_json::{json, Value};
use tokio::time::Instant;

/// One canned reply.
#[derive(Clone, Debug)]
enum Reply {
    Result(Value),
    Error(TransportError),
}

impl Reply {
    fn into_result(self) -> Result<Value, TransportError> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Error(e) => Err(e),
        }
    }
}

/// A call the transport received.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
    /// When the call started, on the Tokio clock.
    pub at: Instant,
}

#[derive(Default)]
struct State {
    /// One-shot replies, consumed in order before the sticky reply.
    scripted: HashMap<String, VecDeque<Reply>>,
    sticky: HashMap<String, Reply>,
    raw: VecDeque<Reply>,
    hanging: HashSet<String>,
    delay: Duration,
    calls: Vec<RecordedCall>,
    raw_bodies: Vec<String>,
}

/// A test transport that answers from a script instead of a node.
///
/// Cloning yields another handle onto the same script and call log, so a
/// test can keep one handle while the client under test owns another.
/// Methods with no reply scripted fail with JSON-RPC error -32601.
#[derive(Clone)]
pub struct NullTransport {
    endpoint: String,
    state: Arc<Mutex<State>>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::with_endpoint("null://node")
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A node reporting `blocks` validated blocks and `headers` known headers.
    pub fn synced_at(blocks: u64, headers: u64) -> Self {
        let transport = Self::new();
        transport.set_result("getblockchaininfo", chain_info(blocks, headers));
        transport
    }

    /// Answer every call to `method` with `result`.
    pub fn set_result(&self, method: &str, result: Value) {
        self.lock().sticky.insert(method.to_string(), Reply::Result(result));
    }

    /// Fail every call to `method` with `error`.
    pub fn set_error(&self, method: &str, error: TransportError) {
        self.lock().sticky.insert(method.to_string(), Reply::Error(error));
    }

    /// Answer the next call to `method` with `result`.
    pub fn push_result(&self, method: &str, result: Value) {
        self.push(method, Reply::Result(result));
    }

    /// Fail the next call to `method` with `error`.
    pub fn push_error(&self, method: &str, error: TransportError) {
        self.push(method, Reply::Error(error));
    }

    /// Answer the next raw post with `reply`.
    pub fn push_raw(&self, reply: Result<Value, TransportError>) {
        let reply = match reply {
            Ok(value) => Reply::Result(value),
            Err(e) => Reply::Error(e),
        };
        self.lock().raw.push_back(reply);
    }

    /// Calls to `method` never complete.
    pub fn hang(&self, method: &str) {
        self.lock().hanging.insert(method.to_string());
    }

    /// Hold every reply back for `delay` on the Tokio clock.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Fail every method, as a node that went away would.
    pub fn go_down(&self) {
        let mut state = self.lock();
        state.scripted.clear();
        state.sticky.clear();
        state.sticky.insert(
            "*".to_string(),
            Reply::Error(TransportError::Http("connection refused".to_string())),
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Methods called, in order.
    pub fn methods(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.method.clone()).collect()
    }

    /// Params of every call to `method`, in order.
    pub fn params_of(&self, method: &str) -> Vec<Vec<Value>> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.params.clone())
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Bodies of every raw post, in order.
    pub fn raw_bodies(&self) -> Vec<String> {
        self.lock().raw_bodies.clone()
    }

    fn push(&self, method: &str, reply: Reply) {
        self.lock()
            .scripted
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the script from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond(delay: Duration, hang: bool, reply: Reply) -> RpcFuture {
        Box::pin(async move {
            if hang {
                std::future::pending::<()>().await;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.into_result()
        })
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcTransport for NullTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> RpcFuture {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: method.to_string(),
            params,
            at: Instant::now(),
        });

        let scripted = state.scripted.get_mut(method).and_then(VecDeque::pop_front);
        let reply = scripted
            .or_else(|| state.sticky.get(method).cloned())
            .or_else(|| state.sticky.get("*").cloned())
            .unwrap_or_else(|| Reply::Error(method_not_found(method)));
        let hang = state.hanging.contains(method);
        Self::respond(state.delay, hang, reply)
    }

    fn post_raw(&self, body: String) -> RpcFuture {
        let mut state = self.lock();
        state.raw_bodies.push(body);
        let scripted = state.raw.pop_front();
        let reply = scripted
            .or_else(|| state.sticky.get("*").cloned())
            .unwrap_or_else(|| Reply::Result(json!({ "result": null, "error": null, "id": null })));
        Self::respond(state.delay, false, reply)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// A `getblockchaininfo` result.
pub fn chain_info(blocks: u64, headers: u64) -> Value {
    json!({
        "chain": "main",
        "blocks": blocks,
        "headers": headers,
        "bestblockhash": format!("{blocks:064x}"),
        "initialblockdownload": false,
        "verificationprogress": 1.0,
    })
}

/// A `gettransaction` result with `confirmations` confirmations.
pub fn wallet_tx(tx_id: &str, confirmations: i64) -> Value {
    json!({
        "txid": tx_id,
        "confirmations": confirmations,
        "amount": 0.1,
        "time": 1_700_000_000u64,
    })
}

fn method_not_found(method: &str) -> TransportError {
    let payload = json!({
        "result": null,
        "error": { "code": -32601, "message": "Method not found" },
        "id": method,
    });
    TransportError::Rpc {
        code: -32601,
        message: "Method not found".to_string(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_shot_replies_precede_sticky_ones() {
        let transport = NullTransport::new();
        transport.set_result("getbalance", json!(1.0));
        transport.push_result("getbalance", json!(2.0));

        assert_eq!(transport.call("getbalance", vec![]).await.unwrap(), json!(2.0));
        assert_eq!(transport.call("getbalance", vec![]).await.unwrap(), json!(1.0));
        assert_eq!(transport.call_count("getbalance"), 2);
    }

    #[tokio::test]
    async fn unscripted_method_is_rpc_error() {
        let transport = NullTransport::new();
        let err = transport.call("getblock", vec![json!("ab")]).await.unwrap_err();
        assert!(matches!(err, TransportError::Rpc { code: -32601, .. }));
        assert_eq!(transport.params_of("getblock"), vec![vec![json!("ab")]]);
    }

    #[tokio::test]
    async fn down_node_fails_everything() {
        let transport = NullTransport::synced_at(10, 10);
        transport.go_down();
        assert!(transport.call("getblockchaininfo", vec![]).await.is_err());
        assert!(transport.post_raw("{}".into()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_holds_reply_back() {
        let transport = NullTransport::synced_at(1, 1);
        transport.set_delay(Duration::from_secs(3));
        let start = Instant::now();
        transport.call("getblockchaininfo", vec![]).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
