//! Ledger-chain client (account/token dialect).

use std::ops::Deref;

use nodepool_types::{Amount, ChainTag, Payout, SendOutcome, TokenAmount};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::command::method;
use crate::error::{ClientError, TransportError};
use crate::node::{check_batch, NodeClient};

/// Maximum recipients of one token transfer.
pub const MAX_TOKEN_BATCH: usize = 10;

/// The chain's native coin. Account balances in it leave as UTXOs.
pub const NATIVE_TOKEN: &str = "DFI";

const HISTORY_LIMIT: u64 = 1_000_000;

/// A wallet-owned token balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub owner: String,
    pub balance: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    owner: String,
    amount: String,
}

/// One row of `listaccounthistory`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountHistoryEntry {
    pub owner: String,
    #[serde(rename = "blockHeight")]
    pub block_height: u64,
    #[serde(default, rename = "blockHash")]
    pub block_hash: String,
    #[serde(default, rename = "blockTime")]
    pub block_time: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub amounts: Vec<String>,
}

/// [`NodeClient`] for the ledger-chain roles.
pub struct LedgerClient {
    node: NodeClient,
}

impl LedgerClient {
    pub fn new(node: NodeClient) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &NodeClient {
        &self.node
    }

    /// Flat fee the node charges for a plain UTXO transfer.
    pub fn utxo_fee(&self) -> Amount {
        utxo_fee(self.node.chain())
    }

    pub async fn send_utxo(&self, from: &str, to: &str, amount: Amount) -> Result<String, ClientError> {
        self.node
            .request(
                method::SEND_UTXOS_FROM,
                vec![json!(from), json!(to), json!(amount)],
                true,
            )
            .await
    }

    /// Move `amount` less the UTXO fee from `from` to `to`, change going to
    /// `to` as well.
    pub async fn send_complete_utxo(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<SendOutcome, ClientError> {
        let fee = self.utxo_fee();
        let net = amount
            .checked_sub(fee)
            .filter(|net| !net.is_negative() && !net.is_zero())
            .ok_or(ClientError::FeeExceedsAmount { amount, fee })?;
        let out_tx_id: String = self
            .node
            .request(
                method::SEND_UTXOS_FROM,
                vec![json!(from), json!(to), json!(net), json!(to)],
                true,
            )
            .await?;
        info!(role = %self.node.role(), from, to, %net, tx_id = %out_tx_id, "sent complete utxo");
        Ok(SendOutcome {
            out_tx_id,
            fee_amount: fee,
        })
    }

    /// Token balances held by addresses of this wallet.
    pub async fn get_token_balances(&self) -> Result<Vec<TokenBalance>, ClientError> {
        let entries: Vec<AccountEntry> = self
            .node
            .request(
                method::LIST_ACCOUNTS,
                vec![
                    json!({}),
                    json!(false),
                    json!({ "indexedAmounts": false, "isMineOnly": true }),
                ],
                false,
            )
            .await?;
        entries
            .into_iter()
            .map(|entry| {
                let balance = entry.amount.parse().map_err(|e| self.decode_error(e))?;
                Ok(TokenBalance {
                    owner: entry.owner,
                    balance,
                })
            })
            .collect()
    }

    /// Transfer `amount` of `token`. The native token leaves the account as
    /// a UTXO; every other token moves account to account.
    pub async fn send_token(
        &self,
        from: &str,
        to: &str,
        token: &str,
        amount: Amount,
    ) -> Result<String, ClientError> {
        let mut recipients = Map::new();
        recipients.insert(to.to_string(), json!(token_amount(amount, token)));
        let method = if token == NATIVE_TOKEN {
            method::ACCOUNT_TO_UTXOS
        } else {
            method::ACCOUNT_TO_ACCOUNT
        };
        self.node
            .request(method, vec![json!(from), Value::Object(recipients)], true)
            .await
    }

    pub async fn send_token_to_many(
        &self,
        from: &str,
        token: &str,
        outputs: &[Payout],
    ) -> Result<String, ClientError> {
        check_batch(outputs.len(), MAX_TOKEN_BATCH)?;
        let recipients: Map<String, Value> = outputs
            .iter()
            .map(|p| (p.address.clone(), json!(token_amount(p.amount, token))))
            .collect();
        self.node
            .request(
                method::ACCOUNT_TO_ACCOUNT,
                vec![json!(from), Value::Object(recipients)],
                true,
            )
            .await
    }

    /// Account history between two heights, for one address or the whole
    /// wallet.
    pub async fn get_history(
        &self,
        from_block: u64,
        to_block: u64,
        address: Option<&str>,
    ) -> Result<Vec<AccountHistoryEntry>, ClientError> {
        let options = json!({
            "depth": to_block.saturating_sub(from_block),
            "maxBlockHeight": to_block,
            "no_rewards": true,
            "limit": HISTORY_LIMIT,
        });
        self.node
            .request(
                method::LIST_ACCOUNT_HISTORY,
                vec![json!(address.unwrap_or("mine")), options],
                false,
            )
            .await
    }

    fn decode_error(&self, e: impl std::fmt::Display) -> ClientError {
        ClientError::Unavailable {
            role: self.node.role(),
            mode: self.node.mode(),
            source: TransportError::Decode(e.to_string()),
        }
    }
}

impl Deref for LedgerClient {
    type Target = NodeClient;

    fn deref(&self) -> &NodeClient {
        &self.node
    }
}

pub fn utxo_fee(chain: ChainTag) -> Amount {
    if chain.is_mainnet() {
        Amount::from_units(132)
    } else {
        Amount::from_units(2220)
    }
}

fn token_amount(amount: Amount, token: &str) -> String {
    TokenAmount {
        amount,
        asset: token.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utxo_fee_depends_on_chain() {
        assert_eq!(utxo_fee(ChainTag::Mainnet).to_string(), "0.00000132");
        assert_eq!(utxo_fee(ChainTag::Testnet).to_string(), "0.0000222");
    }

    #[test]
    fn token_amounts_use_at_notation() {
        assert_eq!(token_amount(Amount::from_units(150_000_000), "BTC"), "1.5@BTC");
    }

    #[test]
    fn history_entry_from_node_json() {
        let entry: AccountHistoryEntry = serde_json::from_value(json!({
            "owner": "tf1qowner",
            "blockHeight": 1200,
            "blockHash": "ab",
            "blockTime": 1700000000,
            "type": "AccountToAccount",
            "txIn": 0,
            "txid": "cd",
            "amounts": ["-1.00000000@DUSD"]
        }))
        .unwrap();
        assert_eq!(entry.block_height, 1200);
        assert_eq!(entry.kind, "AccountToAccount");
    }
}
