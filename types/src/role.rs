//! Node roles and modes.
//!
//! A [`NodeRole`] names a logical function (deposit intake, payout, ...),
//! never a physical machine. Each role is served by up to two nodes, one per
//! [`NodeMode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// Logical purpose of a node connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    /// Deposit intake.
    Input,
    /// Decentralised exchange operations.
    Dex,
    /// Customer payouts.
    Output,
    /// Internal transfers between exchange wallets.
    Internal,
    /// Referral reward payouts.
    Referral,
    /// Bitcoin deposit intake.
    BtcInput,
    /// Bitcoin payouts.
    BtcOutput,
}

impl NodeRole {
    /// Number of roles.
    pub const COUNT: usize = 7;

    /// Every role, in sweep order.
    pub const ALL: [NodeRole; Self::COUNT] = [
        Self::Input,
        Self::Dex,
        Self::Output,
        Self::Internal,
        Self::Referral,
        Self::BtcInput,
        Self::BtcOutput,
    ];

    /// Stable position of this role inside [`NodeRole::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Input => 0,
            Self::Dex => 1,
            Self::Output => 2,
            Self::Internal => 3,
            Self::Referral => 4,
            Self::BtcInput => 5,
            Self::BtcOutput => 6,
        }
    }

    /// Whether this role is backed by Bitcoin Core nodes rather than the
    /// ledger chain.
    pub fn is_bitcoin(&self) -> bool {
        matches!(self, Self::BtcInput | Self::BtcOutput)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Dex => "dex",
            Self::Output => "output",
            Self::Internal => "internal",
            Self::Referral => "referral",
            Self::BtcInput => "btc-input",
            Self::BtcOutput => "btc-output",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| TypesError::UnknownRole(s.to_string()))
    }
}

/// Which of the two redundant nodes of a role is meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// The node used for live operations.
    Active,
    /// The hot standby.
    Passive,
}

impl NodeMode {
    /// Both modes, in preference order.
    pub const ALL: [NodeMode; 2] = [Self::Active, Self::Passive];

    /// Position inside [`NodeMode::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Active => 0,
            Self::Passive => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passive => "passive",
        }
    }

    /// The other member of the pair.
    pub fn other(&self) -> Self {
        match self {
            Self::Active => Self::Passive,
            Self::Passive => Self::Active,
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeMode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            other => Err(TypesError::UnknownMode(other.to_string())),
        }
    }
}
