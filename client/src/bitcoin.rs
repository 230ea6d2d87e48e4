//! Bitcoin Core client.

use std::ops::Deref;

use nodepool_types::{Amount, MempoolAcceptance, Payout, SendOutcome};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::command::method;
use crate::error::ClientError;
use crate::node::{check_batch, NodeClient, MAX_UTXO_BATCH};

/// Virtual size assumed for a one-input, one-output spend.
pub const TX_VSIZE_ESTIMATE: u64 = 135;

/// Fee for a [`TX_VSIZE_ESTIMATE`]-byte transaction at `fee_rate` sat/vB.
pub fn estimate_fee(fee_rate: f64) -> Result<Amount, ClientError> {
    let fee_rate = check_fee_rate(fee_rate)?;
    Ok(Amount::from_units((TX_VSIZE_ESTIMATE as f64 * fee_rate).round() as i64))
}

/// Rates must be finite and not negative.
fn check_fee_rate(fee_rate: f64) -> Result<f64, ClientError> {
    if fee_rate.is_finite() && fee_rate >= 0.0 {
        Ok(fee_rate)
    } else {
        Err(ClientError::InvalidFeeRate(fee_rate))
    }
}

#[derive(Debug, Deserialize)]
struct SendReply {
    #[serde(default)]
    txid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmartFeeReply {
    /// BTC per kvB.
    #[serde(default)]
    feerate: Option<f64>,
}

/// [`NodeClient`] for the Bitcoin roles, with single-UTXO and batched spends.
///
/// Derefs to the inner [`NodeClient`] for the shared operations.
pub struct BitcoinClient {
    node: NodeClient,
    change_address: Option<String>,
    allow_unconfirmed_utxos: bool,
}

impl BitcoinClient {
    pub fn new(node: NodeClient, change_address: Option<String>, allow_unconfirmed_utxos: bool) -> Self {
        Self {
            node,
            change_address,
            allow_unconfirmed_utxos,
        }
    }

    pub fn node(&self) -> &NodeClient {
        &self.node
    }

    /// Spend output `vout` of `utxo_tx_id` to `to`, paying the fee out of
    /// `amount`.
    pub async fn send(
        &self,
        to: &str,
        utxo_tx_id: &str,
        amount: Amount,
        vout: u32,
        fee_rate: f64,
    ) -> Result<SendOutcome, ClientError> {
        let fee = estimate_fee(fee_rate)?;
        let net = amount
            .checked_sub(fee)
            .filter(|net| !net.is_negative() && !net.is_zero())
            .ok_or(ClientError::FeeExceedsAmount { amount, fee })?;

        let outputs = json!([output(to, net)]);
        let options = json!({
            "inputs": [{ "txid": utxo_tx_id, "vout": vout }],
            "replaceable": true,
        });
        let reply: Option<SendReply> = self
            .node
            .request(
                method::SEND,
                vec![outputs, Value::Null, Value::Null, json!(fee_rate), options],
                true,
            )
            .await?;

        let out_tx_id = reply.and_then(|r| r.txid).unwrap_or_default();
        info!(role = %self.node.role(), to, %net, %fee, tx_id = %out_tx_id, "sent utxo");
        Ok(SendOutcome {
            out_tx_id,
            fee_amount: fee,
        })
    }

    /// Pay all `outputs` in one transaction, change going to the configured
    /// change address.
    pub async fn send_many(&self, outputs: &[Payout], fee_rate: f64) -> Result<String, ClientError> {
        check_fee_rate(fee_rate)?;
        check_batch(outputs.len(), MAX_UTXO_BATCH)?;

        let outputs: Vec<Value> = outputs.iter().map(|p| output(&p.address, p.amount)).collect();
        let mut options = json!({
            "replaceable": true,
            "include_unsafe": self.allow_unconfirmed_utxos,
        });
        if let Some(change) = &self.change_address {
            options["change_address"] = json!(change);
        }

        let reply: Option<SendReply> = self
            .node
            .request(
                method::SEND,
                vec![json!(outputs), Value::Null, Value::Null, json!(fee_rate), options],
                true,
            )
            .await?;
        Ok(reply.and_then(|r| r.txid).unwrap_or_default())
    }

    /// Dry-run a signed transaction against the node's mempool policy.
    pub async fn test_mempool_accept(&self, hex: &str) -> Result<MempoolAcceptance, ClientError> {
        let verdicts: Option<Vec<MempoolAcceptance>> = self
            .node
            .request(method::TEST_MEMPOOL_ACCEPT, vec![json!([hex])], false)
            .await?;
        Ok(verdicts
            .and_then(|v| v.into_iter().next())
            .unwrap_or_else(|| MempoolAcceptance {
                reject_reason: Some("no verdict from node".to_string()),
                ..Default::default()
            }))
    }

    /// Broadcast a signed transaction and return its id.
    pub async fn send_raw_transaction(&self, hex: &str) -> Result<String, ClientError> {
        self.node
            .request(method::SEND_RAW_TRANSACTION, vec![json!(hex)], false)
            .await
    }

    /// Smart fee estimate in sat/vB, `None` while the node has no estimate.
    pub async fn estimate_fee_rate(&self, conf_target: u32) -> Result<Option<f64>, ClientError> {
        let reply: SmartFeeReply = self
            .node
            .request(method::ESTIMATE_SMART_FEE, vec![json!(conf_target)], false)
            .await?;
        let rate = reply.feerate.map(|btc_per_kvb| btc_per_kvb * 100_000.0);
        debug!(role = %self.node.role(), conf_target, ?rate, "fee estimate");
        Ok(rate)
    }
}

/// One `{address: amount}` entry of the `send` outputs array.
fn output(address: &str, amount: Amount) -> Value {
    let mut entry = Map::new();
    entry.insert(address.to_string(), json!(amount));
    Value::Object(entry)
}

impl Deref for BitcoinClient {
    type Target = NodeClient;

    fn deref(&self) -> &NodeClient {
        &self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_for_standard_spend() {
        assert_eq!(estimate_fee(10.0).unwrap(), Amount::from_units(1350));
        assert_eq!(estimate_fee(1.5).unwrap(), Amount::from_units(203));
        assert_eq!(estimate_fee(0.0).unwrap(), Amount::from_units(0));
    }

    #[test]
    fn unusable_fee_rates_are_rejected() {
        for rate in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(estimate_fee(rate), Err(ClientError::InvalidFeeRate(_))));
        }
    }

    #[test]
    fn fee_is_taken_out_of_amount() {
        let amount: Amount = "0.5".parse().unwrap();
        let net = amount.checked_sub(estimate_fee(10.0).unwrap()).unwrap();
        assert_eq!(net.to_string(), "0.4999865");
    }
}
