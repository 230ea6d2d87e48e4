//! Chain tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// Identifies which network the configured nodes run on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTag {
    /// The production network.
    #[default]
    Mainnet,
    /// The public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
}

impl ChainTag {
    /// Human-readable name, as reported by `getblockchaininfo` on Bitcoin-style nodes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    pub fn is_mainnet(&self) -> bool {
        *self == Self::Mainnet
    }
}

impl fmt::Display for ChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainTag {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(TypesError::UnknownChain(other.to_string())),
        }
    }
}
