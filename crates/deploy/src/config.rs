//! Bootstrap configuration and the protocol parameters it sets on-chain.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    ArtifactPaths,
    identity::DEFAULT_DERIVATION_PATH,
    network::{AbiValue, DEFAULT_FINALITY_TIMEOUT, TESTNET_GRAPHQL_URL},
    types::Address,
};

/// The default name for the bootstrap configuration file.
pub const BOOTSTRAP_CONF_FILENAME: &str = "Bootstrap.toml";

/// Default checkpoint location, relative to the working directory.
pub const DEFAULT_CHECKPOINT_PATH: &str = "./out/bootstrap-checkpoint.json";

/// Runtime configuration applied by `update_protocol_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol_fee_receiver: Address,
    pub protocol_fee: u64,
    pub protocol_liquidation_fee: u64,
    pub liquidator_fee: u64,
    pub time_request_loan_expires: u64,
    pub oracle_max_stale: u64,
    pub min_loan_duration: u64,
}

impl ProtocolConfig {
    /// Encode as the contract's config struct, fields in declaration order.
    pub fn to_abi_value(&self) -> AbiValue {
        AbiValue::Struct(vec![
            (
                "protocol_fee_receiver".to_string(),
                AbiValue::Address(self.protocol_fee_receiver),
            ),
            ("protocol_fee".to_string(), AbiValue::U64(self.protocol_fee)),
            (
                "protocol_liquidation_fee".to_string(),
                AbiValue::U64(self.protocol_liquidation_fee),
            ),
            ("liquidator_fee".to_string(), AbiValue::U64(self.liquidator_fee)),
            (
                "time_request_loan_expires".to_string(),
                AbiValue::U64(self.time_request_loan_expires),
            ),
            ("oracle_max_stale".to_string(), AbiValue::U64(self.oracle_max_stale)),
            ("min_loan_duration".to_string(), AbiValue::U64(self.min_loan_duration)),
        ])
    }
}

/// Operator-facing protocol parameters.
///
/// Values are passed through unchecked; range validation belongs to the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Fee receiver. Defaults to the admin address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_fee_receiver: Option<Address>,
    pub protocol_fee: u64,
    pub protocol_liquidation_fee: u64,
    pub liquidator_fee: u64,
    /// Seconds before an unfilled loan request expires.
    pub time_request_loan_expires: u64,
    /// Seconds after which an oracle price is considered stale.
    pub oracle_max_stale: u64,
    /// Minimum loan duration in seconds.
    pub min_loan_duration: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            protocol_fee_receiver: None,
            protocol_fee: 100,
            protocol_liquidation_fee: 100,
            liquidator_fee: 100,
            time_request_loan_expires: 28800,
            oracle_max_stale: 30,
            min_loan_duration: 600,
        }
    }
}

impl ProtocolParams {
    /// Build the on-chain config, falling back to `admin` as fee receiver.
    pub fn resolve(&self, admin: Address) -> ProtocolConfig {
        ProtocolConfig {
            protocol_fee_receiver: self.protocol_fee_receiver.unwrap_or(admin),
            protocol_fee: self.protocol_fee,
            protocol_liquidation_fee: self.protocol_liquidation_fee,
            liquidator_fee: self.liquidator_fee,
            time_request_loan_expires: self.time_request_loan_expires,
            oracle_max_stale: self.oracle_max_stale,
            min_loan_duration: self.min_loan_duration,
        }
    }
}

/// Which network to bootstrap against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NetworkTarget {
    /// The in-memory [`LocalChain`](crate::LocalChain).
    Local,
    /// A Fuel node GraphQL endpoint.
    Remote(Url),
}

impl NetworkTarget {
    pub fn testnet() -> Self {
        Self::Remote(Url::parse(TESTNET_GRAPHQL_URL).expect("testnet URL is valid"))
    }
}

impl Default for NetworkTarget {
    fn default() -> Self {
        Self::testnet()
    }
}

impl fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTarget::Local => f.write_str("local"),
            NetworkTarget::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl FromStr for NetworkTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "testnet" => Ok(Self::testnet()),
            url => Url::parse(url)
                .map(Self::Remote)
                .map_err(|e| format!("invalid network '{url}': {e}")),
        }
    }
}

impl TryFrom<String> for NetworkTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetworkTarget> for String {
    fn from(target: NetworkTarget) -> Self {
        target.to_string()
    }
}

/// Everything the bootstrap needs apart from the role secrets.
///
/// Secrets are deliberately not part of this struct so it can be saved to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Target network.
    pub network: NetworkTarget,
    /// Where progress is persisted between runs. Ignored for the local network.
    pub checkpoint: PathBuf,
    /// Seconds to wait for a submitted transaction to be committed.
    pub finality_timeout_secs: u64,
    /// BIP-32 path used to derive every role's key.
    pub derivation_path: String,
    /// Refuse one recovery phrase backing several roles.
    pub strict_roles: bool,
    /// Compiled contract locations.
    pub artifacts: ArtifactPaths,
    /// Values for `update_protocol_config`.
    pub protocol: ProtocolParams,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            network: NetworkTarget::default(),
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            finality_timeout_secs: DEFAULT_FINALITY_TIMEOUT.as_secs(),
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            strict_roles: false,
            artifacts: ArtifactPaths::default(),
            protocol: ProtocolParams::default(),
        }
    }
}

impl BootstrapConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize bootstrap config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Checkpoint location for this network.
    ///
    /// `None` for the local network: its contracts die with the process, so a
    /// checkpoint would only point later runs at contracts that no longer exist.
    pub fn checkpoint_path(&self) -> Option<&Path> {
        match self.network {
            NetworkTarget::Local => None,
            NetworkTarget::Remote(_) => Some(self.checkpoint.as_path()),
        }
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }
}
