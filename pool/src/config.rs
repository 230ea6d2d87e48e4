//! Pool configuration with TOML file support.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use nodepool_client::{NodeClientConfig, RpcCredentials};
use nodepool_types::{ChainTag, NodeMode, NodeRole};
use nodepool_utils::LogFormat;
use serde::{Deserialize, Serialize};

use crate::PoolError;

/// Configuration for the node pool and the process around it.
///
/// Can be loaded from a TOML file via [`PoolConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Network the nodes run on.
    #[serde(default)]
    pub chain: ChainTag,

    /// Credentials shared by every node.
    #[serde(default)]
    pub credentials: Credentials,

    /// Endpoint URLs per role. A role or mode left out is unconfigured.
    #[serde(default)]
    pub nodes: BTreeMap<NodeRole, NodeEndpoints>,

    #[serde(default)]
    pub bitcoin: BitcoinSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub admin: AdminSettings,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub rpc_user: String,
    #[serde(default)]
    pub rpc_password: String,
    #[serde(default)]
    pub wallet_passphrase: String,
}

impl Credentials {
    pub fn rpc(&self) -> RpcCredentials {
        RpcCredentials {
            user: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("rpc_user", &self.rpc_user)
            .field("rpc_password", &"<redacted>")
            .field("wallet_passphrase", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive: Option<String>,
}

impl NodeEndpoints {
    pub fn url(&self, mode: NodeMode) -> Option<&str> {
        match mode {
            NodeMode::Active => self.active.as_deref(),
            NodeMode::Passive => self.passive.as_deref(),
        }
        .filter(|url| !url.trim().is_empty())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BitcoinSettings {
    /// Where batched payouts send their change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_address: Option<String>,
    /// Let batched payouts spend unconfirmed outputs.
    #[serde(default = "default_true")]
    pub allow_unconfirmed_utxos: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Deadline for one queued node call.
    #[serde(default = "default_queue_timeout_ms")]
    pub timeout_ms: u64,
    /// How long the wallet stays unlocked before a spend.
    #[serde(default = "default_unlock_secs")]
    pub unlock_secs: u64,
    /// Probe every node with `getblockchaininfo` when the pool starts.
    #[serde(default = "default_true")]
    pub startup_probe: bool,
}

impl QueueSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Seconds between supervisor sweeps.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Blocks a node may trail its own header tip.
    #[serde(default = "default_max_gap")]
    pub max_block_lag: u64,
    /// Headers the active and passive node may differ by.
    #[serde(default = "default_max_gap")]
    pub max_header_divergence: u64,
    /// Let the supervisor fail over on its own.
    #[serde(default = "default_true")]
    pub auto_swap: bool,
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminSettings {
    #[serde(default = "default_admin_bind")]
    pub bind: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
    /// Bearer token operators must present. Without one the admin API
    /// rejects every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSettings")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_timeout_ms() -> u64 {
    65_000
}

fn default_unlock_secs() -> u64 {
    60
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_gap() -> u64 {
    10
}

fn default_admin_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    7090
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chain: ChainTag::default(),
            credentials: Credentials::default(),
            nodes: BTreeMap::new(),
            bitcoin: BitcoinSettings::default(),
            queue: QueueSettings::default(),
            health: HealthSettings::default(),
            admin: AdminSettings::default(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BitcoinSettings {
    fn default() -> Self {
        Self {
            change_address: None,
            allow_unconfirmed_utxos: default_true(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_queue_timeout_ms(),
            unlock_secs: default_unlock_secs(),
            startup_probe: default_true(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_block_lag: default_max_gap(),
            max_header_divergence: default_max_gap(),
            auto_swap: default_true(),
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            bind: default_admin_bind(),
            port: default_admin_port(),
            token: None,
        }
    }
}

// ── Impl ───────────────────────────────────────────────────────────────

impl PoolConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, PoolError> {
        let config: Self = toml::from_str(s).map_err(|e| PoolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, PoolError> {
        toml::to_string_pretty(self).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        for (role, endpoints) in &self.nodes {
            for mode in NodeMode::ALL {
                if let Some(url) = endpoints.url(mode) {
                    if !(url.starts_with("http://") || url.starts_with("https://")) {
                        return Err(PoolError::Config(format!(
                            "{role} {mode} endpoint must be an http(s) URL, got '{url}'"
                        )));
                    }
                }
            }
        }
        if self.queue.timeout_ms == 0 {
            return Err(PoolError::Config("queue.timeout_ms must be positive".into()));
        }
        if self.health.interval_secs == 0 {
            return Err(PoolError::Config("health.interval_secs must be positive".into()));
        }
        Ok(())
    }

    /// Endpoint URL of one pool slot, if configured.
    pub fn endpoint(&self, role: NodeRole, mode: NodeMode) -> Option<&str> {
        self.nodes.get(&role).and_then(|e| e.url(mode))
    }

    /// Client settings for one pool slot.
    pub fn client_config(&self, role: NodeRole, mode: NodeMode) -> NodeClientConfig {
        NodeClientConfig {
            role,
            mode,
            chain: self.chain,
            wallet_passphrase: self.credentials.wallet_passphrase.clone(),
            call_timeout: self.queue.call_timeout(),
            unlock_secs: self.queue.unlock_secs,
            startup_probe: self.queue.startup_probe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = PoolConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.chain, ChainTag::Mainnet);
        assert_eq!(config.queue.timeout_ms, 65_000);
        assert_eq!(config.health.retry_attempts, 4);
        assert_eq!(config.health.max_header_divergence, 10);
        assert_eq!(config.admin.port, 7090);
        assert_eq!(config.log_format, LogFormat::Human);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn nodes_are_keyed_by_role() {
        let toml = r#"
            chain = "testnet"

            [nodes.dex]
            active = "http://dex-a:8554"

            [nodes.btc-output]
            active = "http://btc-a:8332"
            passive = "http://btc-p:8332"
        "#;
        let config = PoolConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.chain, ChainTag::Testnet);
        assert_eq!(config.endpoint(NodeRole::Dex, NodeMode::Active), Some("http://dex-a:8554"));
        assert_eq!(config.endpoint(NodeRole::Dex, NodeMode::Passive), None);
        assert_eq!(
            config.endpoint(NodeRole::BtcOutput, NodeMode::Passive),
            Some("http://btc-p:8332")
        );
        assert_eq!(config.endpoint(NodeRole::Input, NodeMode::Active), None);
    }

    #[test]
    fn blank_url_counts_as_unconfigured() {
        let config = PoolConfig::from_toml_str("[nodes.input]\nactive = \"\"\n").unwrap();
        assert_eq!(config.endpoint(NodeRole::Input, NodeMode::Active), None);
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let err = PoolConfig::from_toml_str("[nodes.input]\nactive = \"ftp://x\"\n").unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(PoolConfig::from_toml_str("[nodes.mystery]\nactive = \"http://x\"\n").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut config = PoolConfig::default();
        config.credentials.rpc_password = "hunter2".into();
        config.credentials.wallet_passphrase = "open sesame".into();
        config.admin.token = Some("letmein".into());
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("open sesame"));
        assert!(!printed.contains("letmein"));
    }

    #[test]
    fn client_config_carries_queue_settings() {
        let mut config = PoolConfig::default();
        config.queue.timeout_ms = 5_000;
        config.credentials.wallet_passphrase = "pw".into();
        let client = config.client_config(NodeRole::Output, NodeMode::Passive);
        assert_eq!(client.call_timeout, Duration::from_secs(5));
        assert_eq!(client.unlock_secs, 60);
        assert_eq!(client.wallet_passphrase, "pw");
        assert_eq!(client.mode, NodeMode::Passive);
    }
}
