//! Network client seam.
//!
//! The pipeline never talks to a node directly: it builds [`DeployRequest`]s and
//! [`CallRequest`]s and hands them to a [`NetworkClient`] together with the
//! identity that must sign them. Implementations submit the transaction and
//! resolve only once finality is observed.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::{
    DeployError, SigningIdentity,
    types::{Address, ContractId},
};

#[cfg(feature = "fuel")]
mod fuel;
mod graphql;
mod local;

#[cfg(feature = "fuel")]
pub use fuel::FuelClient;
pub use graphql::{ChainInfo, GraphQlClient};
pub use local::{ContractState, LocalChain, RecordedTx, TxAction};

/// Public Fuel testnet GraphQL endpoint.
pub const TESTNET_GRAPHQL_URL: &str = "https://testnet.fuel.network/v1/graphql";

/// How long to wait for a submitted transaction to be committed.
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes written into the bytecode at a configurable's offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurableOverride {
    pub name: String,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// A contract deployment transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub bytecode: Bytes,
    pub configurables: Vec<ConfigurableOverride>,
    /// Salt mixed into the contract id; a fresh salt yields a fresh contract.
    pub salt: [u8; 32],
}

/// An argument to a contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiValue {
    /// An `Address { bits: b256 }` struct.
    Address(Address),
    U64(u64),
    /// A struct, fields in declaration order.
    Struct(Vec<(String, AbiValue)>),
}

impl AbiValue {
    /// Field of a struct value by name.
    pub fn field(&self, name: &str) -> Option<&AbiValue> {
        match self {
            AbiValue::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// A contract call transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub contract_id: ContractId,
    pub function: String,
    pub args: Vec<AbiValue>,
}

/// Confirmation of a finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Absent when the client does not report the transaction id.
    pub tx_id: Option<B256>,
    /// Height of the block that included the transaction, when the client reports it.
    pub block_height: Option<u64>,
}

/// Confirmation of a finalized deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    pub contract_id: ContractId,
    pub receipt: TxReceipt,
}

/// Submits signed transactions and waits for their finality.
pub trait NetworkClient: Send + Sync {
    /// Human readable endpoint, used in logs and checkpoints.
    fn endpoint(&self) -> String;

    /// Deploy a contract signed by `signer`.
    fn deploy(
        &self,
        request: DeployRequest,
        signer: &SigningIdentity,
    ) -> impl Future<Output = Result<DeployReceipt, DeployError>> + Send;

    /// Call a deployed contract signed by `signer`.
    fn call(
        &self,
        request: CallRequest,
        signer: &SigningIdentity,
    ) -> impl Future<Output = Result<TxReceipt, DeployError>> + Send;

    /// Whether a contract with `id` is deployed.
    fn contract_exists(
        &self,
        id: ContractId,
    ) -> impl Future<Output = Result<bool, DeployError>> + Send;
}
