//! RPC method names and CLI-style command parsing.

use serde_json::Value;

use crate::error::ClientError;

/// RPC methods issued by the clients in this crate.
pub mod method {
    pub const GET_BLOCKCHAIN_INFO: &str = "getblockchaininfo";
    pub const GET_BLOCK: &str = "getblock";
    pub const GET_TRANSACTION: &str = "gettransaction";
    pub const GET_NEW_ADDRESS: &str = "getnewaddress";
    pub const GET_BALANCE: &str = "getbalance";
    pub const LIST_UNSPENT: &str = "listunspent";
    pub const SEND_MANY: &str = "sendmany";
    pub const UNLOCK: &str = "walletpassphrase";

    // Bitcoin Core
    pub const SEND: &str = "send";
    pub const SEND_RAW_TRANSACTION: &str = "sendrawtransaction";
    pub const TEST_MEMPOOL_ACCEPT: &str = "testmempoolaccept";
    pub const ESTIMATE_SMART_FEE: &str = "estimatesmartfee";

    // Ledger chain
    pub const SEND_UTXOS_FROM: &str = "sendutxosfrom";
    pub const LIST_ACCOUNTS: &str = "listaccounts";
    pub const ACCOUNT_TO_ACCOUNT: &str = "accounttoaccount";
    pub const ACCOUNT_TO_UTXOS: &str = "accounttoutxos";
    pub const LIST_ACCOUNT_HISTORY: &str = "listaccounthistory";
}

/// A `method arg1 arg2 ...` command line, as typed by an operator.
///
/// Every argument must be a JSON literal: numbers and booleans as-is,
/// strings quoted (`getblock "00ab..." 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct CliCommand {
    pub method: String,
    pub params: Vec<Value>,
}

impl CliCommand {
    pub fn parse(line: &str) -> Result<Self, ClientError> {
        let mut parts = line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| ClientError::InvalidCommand("empty command".to_string()))?;
        let params = parts
            .map(|part| {
                serde_json::from_str(part).map_err(|e| {
                    ClientError::InvalidCommand(format!("argument {part} is not valid JSON: {e}"))
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(Self {
            method: method.to_string(),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_method_and_json_arguments() {
        let cmd = CliCommand::parse("getblock \"00ab\" 1").unwrap();
        assert_eq!(cmd.method, "getblock");
        assert_eq!(cmd.params, vec![json!("00ab"), json!(1)]);
    }

    #[test]
    fn method_without_arguments() {
        let cmd = CliCommand::parse("  getblockchaininfo  ").unwrap();
        assert_eq!(cmd.method, "getblockchaininfo");
        assert!(cmd.params.is_empty());
    }

    #[test]
    fn structured_arguments() {
        let cmd = CliCommand::parse(r#"listunspent 1 9999999 ["bc1qaddr"] true"#).unwrap();
        assert_eq!(cmd.params[2], json!(["bc1qaddr"]));
        assert_eq!(cmd.params[3], json!(true));
    }

    #[test]
    fn bare_word_argument_is_rejected() {
        let err = CliCommand::parse("getblock 00ab").unwrap_err();
        assert!(matches!(err, ClientError::InvalidCommand(_)));
    }

    #[test]
    fn empty_line_is_rejected() {
        assert!(CliCommand::parse("   ").is_err());
    }
}
