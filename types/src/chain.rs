//! Records returned by blockchain nodes.
//!
//! Field names follow the node's JSON-RPC replies. Unknown fields are
//! ignored so that both Bitcoin Core and ledger-chain nodes deserialize into
//! the same shapes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::amount::Amount;
use crate::error::TypesError;

/// Chain sync status, from `getblockchaininfo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Network name as reported by the node.
    #[serde(default)]
    pub chain: String,
    /// Height of the locally validated chain.
    pub blocks: u64,
    /// Height of the best known header chain.
    pub headers: u64,
    #[serde(default, rename = "bestblockhash")]
    pub best_block_hash: String,
    #[serde(default, rename = "initialblockdownload")]
    pub initial_block_download: bool,
    #[serde(default, rename = "verificationprogress")]
    pub verification_progress: f64,
}

impl ChainInfo {
    /// How far validated blocks trail the header tip.
    pub fn lag(&self) -> u64 {
        self.headers.saturating_sub(self.blocks)
    }
}

/// Block detail at verbosity 1 (transaction ids only).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    #[serde(default)]
    pub confirmations: i64,
    pub height: u64,
    #[serde(default)]
    pub time: u64,
    #[serde(default, rename = "previousblockhash")]
    pub previous_block_hash: Option<String>,
    #[serde(default)]
    pub tx: Vec<String>,
}

/// A wallet transaction, from `gettransaction`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub txid: String,
    #[serde(default)]
    pub confirmations: i64,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default)]
    pub fee: Option<Amount>,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub time: u64,
}

impl WalletTransaction {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }
}

/// An unspent transaction output, from `listunspent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub address: Option<String>,
    pub amount: Amount,
    #[serde(default)]
    pub confirmations: i64,
    #[serde(default)]
    pub spendable: bool,
}

/// One output of a batched payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub address: String,
    pub amount: Amount,
}

impl Payout {
    pub fn new(address: impl Into<String>, amount: Amount) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Result of a spend that charges a fee on top of, or out of, the payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub out_tx_id: String,
    pub fee_amount: Amount,
}

/// Verdict of `testmempoolaccept` for one raw transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MempoolAcceptance {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub vsize: u64,
    #[serde(default, rename = "reject-reason")]
    pub reject_reason: Option<String>,
}

/// A token balance in the ledger chain's `<amount>@<asset>` notation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub amount: Amount,
    pub asset: String,
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.amount, self.asset)
    }
}

impl FromStr for TokenAmount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, asset) = s
            .split_once('@')
            .ok_or_else(|| TypesError::InvalidAmount(s.to_string()))?;
        if asset.is_empty() {
            return Err(TypesError::InvalidAmount(s.to_string()));
        }
        Ok(Self {
            amount: amount.parse()?,
            asset: asset.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_info_from_node_reply() {
        let json = r#"{
            "chain": "main",
            "blocks": 812000,
            "headers": 812004,
            "bestblockhash": "00000000000000000002",
            "initialblockdownload": false,
            "verificationprogress": 0.9999,
            "pruned": false
        }"#;
        let info: ChainInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.blocks, 812000);
        assert_eq!(info.lag(), 4);
        assert!(!info.initial_block_download);
    }

    #[test]
    fn lag_saturates_when_blocks_ahead() {
        let info = ChainInfo {
            chain: String::new(),
            blocks: 10,
            headers: 8,
            best_block_hash: String::new(),
            initial_block_download: false,
            verification_progress: 1.0,
        };
        assert_eq!(info.lag(), 0);
    }

    #[test]
    fn wallet_transaction_with_negative_amounts() {
        let json = r#"{"txid":"abc","confirmations":6,"amount":-0.5,"fee":-0.0001,"time":1680000000}"#;
        let tx: WalletTransaction = serde_json::from_str(json).unwrap();
        assert!(tx.is_confirmed());
        assert_eq!(tx.amount.units(), -50_000_000);
        assert_eq!(tx.fee, Some(Amount::from_units(-10_000)));
    }

    #[test]
    fn token_amount_parses_and_displays() {
        let token: TokenAmount = "12.5@DFI".parse().unwrap();
        assert_eq!(token.amount.units(), 1_250_000_000);
        assert_eq!(token.asset, "DFI");
        assert_eq!(token.to_string(), "12.5@DFI");
        assert!("12.5".parse::<TokenAmount>().is_err());
        assert!("12.5@".parse::<TokenAmount>().is_err());
    }
}
