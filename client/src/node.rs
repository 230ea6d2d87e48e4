//! Node client: one physical node behind one call queue.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nodepool_types::{Amount, Block, ChainInfo, ChainTag, NodeMode, NodeRole, Payout, Utxo, WalletTransaction};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::command::{method, CliCommand};
use crate::error::{ClientError, TransportError};
use crate::queue::{CallQueue, DEFAULT_CALL_TIMEOUT};
use crate::transport::RpcTransport;

/// Maximum number of outputs the node accepts in one `sendmany`.
pub const MAX_UTXO_BATCH: usize = 100;

/// Default wait for a transaction to confirm.
pub const DEFAULT_TX_WAIT: Duration = Duration::from_secs(600);

/// Interval between confirmation polls.
pub const TX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Seconds a wallet stays unlocked after `walletpassphrase`.
pub const DEFAULT_UNLOCK_SECS: u64 = 60;

/// Attempts for a call whose reply could not be parsed.
const DECODE_ATTEMPTS: u32 = 3;

/// Static settings of a [`NodeClient`].
#[derive(Clone)]
pub struct NodeClientConfig {
    pub role: NodeRole,
    pub mode: NodeMode,
    pub chain: ChainTag,
    pub wallet_passphrase: String,
    pub call_timeout: Duration,
    pub unlock_secs: u64,
    /// Issue a `getblockchaininfo` right after construction and log the outcome.
    pub startup_probe: bool,
}

impl NodeClientConfig {
    pub fn new(role: NodeRole, mode: NodeMode) -> Self {
        Self {
            role,
            mode,
            chain: ChainTag::default(),
            wallet_passphrase: String::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            unlock_secs: DEFAULT_UNLOCK_SECS,
            startup_probe: true,
        }
    }
}

impl fmt::Debug for NodeClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClientConfig")
            .field("role", &self.role)
            .field("mode", &self.mode)
            .field("chain", &self.chain)
            .field("call_timeout", &self.call_timeout)
            .field("unlock_secs", &self.unlock_secs)
            .field("startup_probe", &self.startup_probe)
            .finish_non_exhaustive()
    }
}

/// Client for one node's JSON-RPC endpoint.
///
/// Every call, including the wallet unlock that precedes spends, runs
/// through the client's private [`CallQueue`], so two calls against the same
/// node never overlap. Transport failures come back as
/// [`ClientError::Unavailable`] with the original cause attached.
pub struct NodeClient {
    role: NodeRole,
    mode: NodeMode,
    chain: ChainTag,
    wallet_passphrase: String,
    unlock_secs: u64,
    transport: Arc<dyn RpcTransport>,
    queue: CallQueue,
}

impl NodeClient {
    /// Create the client and its queue worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: NodeClientConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let queue = CallQueue::new(
            format!("{}-{}", config.role, config.mode),
            config.call_timeout,
        );
        let client = Self {
            role: config.role,
            mode: config.mode,
            chain: config.chain,
            wallet_passphrase: config.wallet_passphrase,
            unlock_secs: config.unlock_secs,
            transport,
            queue,
        };
        if config.startup_probe {
            client.spawn_probe();
        }
        client
    }

    /// Best-effort chain-info probe. Failure is logged only.
    fn spawn_probe(&self) {
        let probe = self
            .queue
            .submit(self.rpc_job(method::GET_BLOCKCHAIN_INFO, Vec::new(), false));
        let (role, mode) = (self.role, self.mode);
        let endpoint = self.transport.endpoint().to_string();
        tokio::spawn(async move {
            match probe.await {
                Ok(info) => info!(%role, %mode, %endpoint, blocks = ?info.get("blocks"), "node reachable"),
                Err(e) => warn!(%role, %mode, %endpoint, error = %e, "node probe failed"),
            }
        });
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn chain(&self) -> ChainTag {
        self.chain
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Reject every call still waiting in this client's queue.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// Calls waiting or running against this node.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // ── Chain ───────────────────────────────────────────────────────────

    pub async fn get_info(&self) -> Result<ChainInfo, ClientError> {
        self.request(method::GET_BLOCKCHAIN_INFO, Vec::new(), false).await
    }

    /// Fails with [`ClientError::OutOfSync`] when validated blocks trail the
    /// header tip by more than one block.
    pub async fn check_sync(&self) -> Result<ChainInfo, ClientError> {
        let info = self.get_info().await?;
        if info.lag() > 1 {
            return Err(ClientError::OutOfSync { lag: info.lag() });
        }
        Ok(info)
    }

    pub async fn get_block(&self, hash: &str) -> Result<Block, ClientError> {
        self.request(method::GET_BLOCK, vec![json!(hash), json!(1)], false)
            .await
    }

    // ── Transactions ────────────────────────────────────────────────────

    pub async fn get_transaction(&self, tx_id: &str) -> Result<WalletTransaction, ClientError> {
        self.request(method::GET_TRANSACTION, vec![json!(tx_id)], false)
            .await
    }

    /// Poll until `tx_id` has at least one confirmation, every
    /// [`TX_POLL_INTERVAL`], for at most `timeout`.
    pub async fn wait_for_transaction(
        &self,
        tx_id: &str,
        timeout: Duration,
    ) -> Result<WalletTransaction, ClientError> {
        self.wait_for_transaction_every(tx_id, TX_POLL_INTERVAL, timeout)
            .await
    }

    /// Like [`wait_for_transaction`](Self::wait_for_transaction) with a
    /// custom poll interval.
    ///
    /// Each poll is its own queued call, so other work against this node
    /// waits at most one poll, never the whole wait.
    pub async fn wait_for_transaction_every(
        &self,
        tx_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<WalletTransaction, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut polls = 0u32;
        loop {
            polls += 1;
            let tx = self.get_transaction(tx_id).await?;
            if tx.is_confirmed() {
                debug!(role = %self.role, mode = %self.mode, tx_id, polls, "transaction confirmed");
                return Ok(tx);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }
        warn!(role = %self.role, mode = %self.mode, tx_id, polls, "wait for transaction timed out");
        Err(ClientError::WaitTimedOut {
            tx_id: tx_id.to_string(),
        })
    }

    pub async fn get_new_address(&self, label: &str, address_type: &str) -> Result<String, ClientError> {
        self.request(
            method::GET_NEW_ADDRESS,
            vec![json!(label), json!(address_type)],
            false,
        )
        .await
    }

    // ── Wallet ──────────────────────────────────────────────────────────

    pub async fn get_balance(&self) -> Result<Amount, ClientError> {
        self.request(method::GET_BALANCE, Vec::new(), false).await
    }

    pub async fn list_unspent(&self) -> Result<Vec<Utxo>, ClientError> {
        self.request(method::LIST_UNSPENT, Vec::new(), false).await
    }

    /// Pay every output in one `sendmany`, unlocking the wallet first.
    ///
    /// Outputs to the same address collapse into the last one, as the node
    /// takes an address→amount map.
    pub async fn send_to_many(&self, outputs: &[Payout]) -> Result<String, ClientError> {
        check_batch(outputs.len(), MAX_UTXO_BATCH)?;
        let batch: Map<String, Value> = outputs
            .iter()
            .map(|p| (p.address.clone(), json!(p.amount)))
            .collect();
        self.request(method::SEND_MANY, vec![json!(""), Value::Object(batch)], true)
            .await
    }

    // ── Forwarding ──────────────────────────────────────────────────────

    /// Post a raw JSON-RPC request body and return the node's reply as-is.
    pub async fn send_raw_command(&self, command: String) -> Result<Value, ClientError> {
        let transport = Arc::clone(&self.transport);
        let (role, mode) = (self.role, self.mode);
        self.queue
            .submit(async move {
                transport
                    .post_raw(command)
                    .await
                    .map_err(|source| ClientError::Unavailable { role, mode, source })
            })
            .await
            .inspect_err(|e| debug!(%role, %mode, error = %e, "raw node command failed"))
    }

    /// Run a `method arg1 arg2 ...` line with JSON-literal arguments.
    ///
    /// The wallet is unlocked first unless `skip_auto_unlock` is set.
    pub async fn send_cli_command(
        &self,
        command_line: &str,
        skip_auto_unlock: bool,
    ) -> Result<Value, ClientError> {
        let command = CliCommand::parse(command_line)?;
        self.request(&command.method, command.params, !skip_auto_unlock)
            .await
    }

    // ── Plumbing ────────────────────────────────────────────────────────

    /// Queue `method` and decode its result into `T`.
    ///
    /// With `unlock`, the wallet unlock and the call run inside the same
    /// queued unit, so no other call against this node slips in between.
    /// Replies that cannot be parsed are retried.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
        unlock: bool,
    ) -> Result<T, ClientError> {
        let mut attempt = 1;
        let value = loop {
            let result = self
                .queue
                .submit(self.rpc_job(method, params.clone(), unlock))
                .await;
            match result {
                Err(ClientError::Unavailable { ref source, .. })
                    if source.is_decode() && attempt < DECODE_ATTEMPTS =>
                {
                    attempt += 1;
                    debug!(role = %self.role, mode = %self.mode, method, attempt, "retrying node call");
                }
                Err(e) => {
                    debug!(role = %self.role, mode = %self.mode, method, error = %e, "exception during node call");
                    return Err(e);
                }
                Ok(value) => break value,
            }
        };

        serde_json::from_value(value).map_err(|e| ClientError::Unavailable {
            role: self.role,
            mode: self.mode,
            source: TransportError::Decode(format!("{method}: {e}")),
        })
    }

    /// Build the queued unit for one call. Owns everything it touches.
    fn rpc_job(
        &self,
        method: &str,
        params: Vec<Value>,
        unlock: bool,
    ) -> impl Future<Output = Result<Value, ClientError>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let unlock_params =
            unlock.then(|| vec![json!(self.wallet_passphrase), json!(self.unlock_secs)]);
        let method = method.to_string();
        let (role, mode) = (self.role, self.mode);

        async move {
            let unavailable = |source| ClientError::Unavailable { role, mode, source };
            if let Some(unlock_params) = unlock_params {
                transport
                    .call(method::UNLOCK, unlock_params)
                    .await
                    .map_err(unavailable)?;
            }
            transport.call(&method, params).await.map_err(unavailable)
        }
    }
}

impl fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeClient")
            .field("role", &self.role)
            .field("mode", &self.mode)
            .field("chain", &self.chain)
            .field("endpoint", &self.transport.endpoint())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Reject batches above the node's per-call output limit.
pub(crate) fn check_batch(count: usize, max: usize) -> Result<(), ClientError> {
    if count > max {
        return Err(ClientError::BatchTooLarge { count, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_limit_is_inclusive() {
        assert!(check_batch(100, MAX_UTXO_BATCH).is_ok());
        let err = check_batch(101, MAX_UTXO_BATCH).unwrap_err();
        assert!(matches!(err, ClientError::BatchTooLarge { count: 101, max: 100 }));
    }

    #[test]
    fn config_debug_hides_passphrase() {
        let mut config = NodeClientConfig::new(NodeRole::Output, NodeMode::Active);
        config.wallet_passphrase = "correct horse".into();
        let printed = format!("{config:?}");
        assert!(printed.contains("Output"));
        assert!(!printed.contains("correct horse"));
    }
}
