//! Prometheus metrics for the node pool.
//!
//! [`PoolMetrics`] owns a dedicated [`Registry`] that the admin `/metrics`
//! endpoint encodes into the Prometheus text exposition format. Per-node
//! series are labelled with `role` and `mode`.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_vec_with_registry, Encoder, Histogram, HistogramOpts, IntCounterVec,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

use nodepool_types::{ChainInfo, NodeMode, NodeRole};

/// Central collection of all pool-level Prometheus metrics.
pub struct PoolMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Connected-pointer changes, manual or automatic.
    pub swaps: IntCounterVec,
    /// Errors reported by health sweeps.
    pub health_errors: IntCounterVec,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub block_height: IntGaugeVec,
    pub header_height: IntGaugeVec,
    /// Calls waiting or running per node.
    pub queue_depth: IntGaugeVec,
    /// 1 while the supervisor considers the node down.
    pub node_down: IntGaugeVec,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of one full health sweep, in seconds.
    pub sweep_seconds: Histogram,
}

impl PoolMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();
        let node_labels = &["role", "mode"];

        let swaps = register_int_counter_vec_with_registry!(
            Opts::new("nodepool_swaps_total", "Connected node changes per role"),
            &["role"],
            registry
        )
        .expect("failed to register swaps counter");

        let health_errors = register_int_counter_vec_with_registry!(
            Opts::new(
                "nodepool_health_errors_total",
                "Health check errors reported per role"
            ),
            &["role"],
            registry
        )
        .expect("failed to register health_errors counter");

        let block_height = register_int_gauge_vec_with_registry!(
            Opts::new("nodepool_block_height", "Validated block height per node"),
            node_labels,
            registry
        )
        .expect("failed to register block_height gauge");

        let header_height = register_int_gauge_vec_with_registry!(
            Opts::new("nodepool_header_height", "Best known header height per node"),
            node_labels,
            registry
        )
        .expect("failed to register header_height gauge");

        let queue_depth = register_int_gauge_vec_with_registry!(
            Opts::new("nodepool_queue_depth", "Calls waiting or running per node"),
            node_labels,
            registry
        )
        .expect("failed to register queue_depth gauge");

        let node_down = register_int_gauge_vec_with_registry!(
            Opts::new("nodepool_node_down", "1 while a node is considered down"),
            node_labels,
            registry
        )
        .expect("failed to register node_down gauge");

        // 10 ms → ~80 s; a sweep with retries against a dead node takes seconds.
        let sweep_seconds = register_histogram_with_registry!(
            HistogramOpts::new("nodepool_health_sweep_seconds", "Duration of one health sweep")
                .buckets(prometheus::exponential_buckets(0.01, 2.0, 14).unwrap()),
            registry
        )
        .expect("failed to register sweep_seconds histogram");

        Self {
            registry,
            swaps,
            health_errors,
            block_height,
            header_height,
            queue_depth,
            node_down,
            sweep_seconds,
        }
    }

    pub fn record_chain_info(&self, role: NodeRole, mode: NodeMode, info: &ChainInfo) {
        let labels = [role.as_str(), mode.as_str()];
        self.block_height
            .with_label_values(&labels)
            .set(clamp(info.blocks));
        self.header_height
            .with_label_values(&labels)
            .set(clamp(info.headers));
    }

    pub fn record_queue_depth(&self, role: NodeRole, mode: NodeMode, depth: usize) {
        self.queue_depth
            .with_label_values(&[role.as_str(), mode.as_str()])
            .set(depth.try_into().unwrap_or(i64::MAX));
    }

    pub fn record_down(&self, role: NodeRole, mode: NodeMode, down: bool) {
        self.node_down
            .with_label_values(&[role.as_str(), mode.as_str()])
            .set(i64::from(down));
    }

    pub fn record_swap(&self, role: NodeRole) {
        self.swaps.with_label_values(&[role.as_str()]).inc();
    }

    pub fn record_health_error(&self, role: NodeRole) {
        self.health_errors.with_label_values(&[role.as_str()]).inc();
    }

    /// Encode every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(height: u64) -> i64 {
    height.try_into().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_text_carries_labels() {
        let metrics = PoolMetrics::new();
        metrics.record_swap(NodeRole::BtcOutput);
        metrics.record_down(NodeRole::Dex, NodeMode::Passive, true);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"nodepool_swaps_total{role="btc-output"} 1"#));
        assert!(text.contains(r#"nodepool_node_down{mode="passive",role="dex"} 1"#));
    }
}
