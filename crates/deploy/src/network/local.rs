//! In-memory network for dry runs and tests.
//!
//! Every account is funded and each accepted transaction produces a block. The
//! contract entry points the bootstrap relies on behave like the deployed
//! protocol contract: owner-gated `add_admin`, admin-gated `update_protocol_config`.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::primitives::B256;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{
    AbiValue, CallRequest, ConfigurableOverride, DeployReceipt, DeployRequest, NetworkClient,
    TxReceipt,
};
use crate::{
    DeployError, SigningIdentity,
    pipeline::{ADD_ADMIN_FN, PROTOCOL_OWNER_CONFIGURABLE, UPDATE_PROTOCOL_CONFIG_FN},
    types::{Address, ContractId},
};

/// Contract-side state of a deployed protocol contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    /// Value of the `PROTOCOL_OWNER` configurable.
    pub owner: Address,
    pub admins: BTreeSet<Address>,
    /// Last accepted `update_protocol_config` argument.
    pub protocol_config: Option<AbiValue>,
}

/// What a recorded transaction tried to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAction {
    Deploy {
        configurables: Vec<ConfigurableOverride>,
    },
    Call {
        function: String,
        args: Vec<AbiValue>,
    },
}

/// A transaction seen by the local chain, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTx {
    pub signer: Address,
    pub contract_id: ContractId,
    pub action: TxAction,
    pub accepted: bool,
}

#[derive(Debug)]
struct ChainState {
    height: u64,
    reachable: bool,
    unfunded: HashSet<Address>,
    contracts: HashMap<ContractId, ContractState>,
    transactions: Vec<RecordedTx>,
}

/// An in-memory network client.
#[derive(Debug)]
pub struct LocalChain {
    state: Mutex<ChainState>,
    finality_delay: Duration,
    finality_timeout: Option<Duration>,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                height: 0,
                reachable: true,
                unfunded: HashSet::new(),
                contracts: HashMap::new(),
                transactions: Vec::new(),
            }),
            finality_delay: Duration::ZERO,
            finality_timeout: None,
        }
    }

    /// Delay between inclusion and finality.
    pub fn with_finality_delay(mut self, delay: Duration) -> Self {
        self.finality_delay = delay;
        self
    }

    /// Give up waiting for finality after `timeout`.
    pub fn with_finality_timeout(mut self, timeout: Duration) -> Self {
        self.finality_timeout = Some(timeout);
        self
    }

    /// Simulate the node going offline or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Empty an account so its deployments are rejected.
    pub fn drain(&self, address: Address) {
        self.lock().unfunded.insert(address);
    }

    /// Every transaction submitted so far, in submission order.
    pub fn transactions(&self) -> Vec<RecordedTx> {
        self.lock().transactions.clone()
    }

    pub fn contract(&self, id: &ContractId) -> Option<ContractState> {
        self.lock().contracts.get(id).cloned()
    }

    pub fn contract_count(&self) -> usize {
        self.lock().contracts.len()
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply_deploy(
        &self,
        request: &DeployRequest,
        signer: Address,
    ) -> Result<DeployReceipt, DeployError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(DeployError::Network("local chain is unreachable".to_string()));
        }

        let contract_id = contract_id_for(request);
        let rejection = if state.unfunded.contains(&signer) {
            Some(format!("insufficient balance for {signer}"))
        } else if state.contracts.contains_key(&contract_id) {
            Some(format!("contract {contract_id} already exists"))
        } else {
            None
        };

        state.transactions.push(RecordedTx {
            signer,
            contract_id,
            action: TxAction::Deploy {
                configurables: request.configurables.clone(),
            },
            accepted: rejection.is_none(),
        });

        if let Some(reason) = rejection {
            return Err(DeployError::Deployment(reason));
        }

        // An unset configurable keeps the zero default compiled into the bytecode.
        let owner = request
            .configurables
            .iter()
            .find(|c| c.name == PROTOCOL_OWNER_CONFIGURABLE)
            .and_then(|c| <[u8; 32]>::try_from(c.data.as_slice()).ok())
            .map(Address::from)
            .unwrap_or_else(|| Address::from([0u8; 32]));

        state.contracts.insert(
            contract_id,
            ContractState {
                owner,
                admins: BTreeSet::new(),
                protocol_config: None,
            },
        );
        state.height += 1;

        Ok(DeployReceipt {
            contract_id,
            receipt: TxReceipt {
                tx_id: Some(random_tx_id()),
                block_height: Some(state.height),
            },
        })
    }

    fn apply_call(&self, request: &CallRequest, signer: Address) -> Result<TxReceipt, DeployError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(DeployError::Network("local chain is unreachable".to_string()));
        }

        let outcome = match state.contracts.get_mut(&request.contract_id) {
            None => Err(DeployError::Reverted(format!(
                "contract {} does not exist",
                request.contract_id
            ))),
            Some(contract) => execute(contract, request, signer),
        };

        state.transactions.push(RecordedTx {
            signer,
            contract_id: request.contract_id,
            action: TxAction::Call {
                function: request.function.clone(),
                args: request.args.clone(),
            },
            accepted: outcome.is_ok(),
        });
        outcome?;

        state.height += 1;
        Ok(TxReceipt {
            tx_id: Some(random_tx_id()),
            block_height: Some(state.height),
        })
    }

    async fn await_finality(&self, receipt: &TxReceipt) -> Result<(), DeployError> {
        let wait = tokio::time::sleep(self.finality_delay);
        match self.finality_timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| {
                DeployError::FinalityTimeout(format!(
                    "transaction {:?} not final after {timeout:?}",
                    receipt.tx_id
                ))
            }),
            None => {
                wait.await;
                Ok(())
            }
        }
    }
}

/// Contract-side execution of the protocol entry points.
fn execute(
    contract: &mut ContractState,
    request: &CallRequest,
    signer: Address,
) -> Result<(), DeployError> {
    match (request.function.as_str(), request.args.as_slice()) {
        (ADD_ADMIN_FN, [AbiValue::Address(admin)]) => {
            if signer != contract.owner {
                return Err(DeployError::Authorization(format!(
                    "{signer} is not the protocol owner"
                )));
            }
            // Re-registering an existing admin is a no-op.
            contract.admins.insert(*admin);
            Ok(())
        }
        (UPDATE_PROTOCOL_CONFIG_FN, [config @ AbiValue::Struct(_)]) => {
            if !contract.admins.contains(&signer) {
                return Err(DeployError::Authorization(format!(
                    "{signer} is not a protocol admin"
                )));
            }
            contract.protocol_config = Some(config.clone());
            Ok(())
        }
        (ADD_ADMIN_FN | UPDATE_PROTOCOL_CONFIG_FN, _) => Err(DeployError::Reverted(format!(
            "invalid arguments for {}",
            request.function
        ))),
        (other, _) => Err(DeployError::Reverted(format!("unknown function {other}"))),
    }
}

fn contract_id_for(request: &DeployRequest) -> ContractId {
    let mut hasher = Sha256::new();
    hasher.update(request.salt);
    hasher.update(&request.bytecode);
    for configurable in &request.configurables {
        hasher.update(configurable.offset.to_be_bytes());
        hasher.update(&configurable.data);
    }
    let digest: [u8; 32] = hasher.finalize().into();
    ContractId::from(digest)
}

fn random_tx_id() -> B256 {
    B256::from(rand::rng().random::<[u8; 32]>())
}

impl NetworkClient for LocalChain {
    fn endpoint(&self) -> String {
        "local".to_string()
    }

    async fn deploy(
        &self,
        request: DeployRequest,
        signer: &SigningIdentity,
    ) -> Result<DeployReceipt, DeployError> {
        let receipt = self.apply_deploy(&request, signer.address())?;
        tracing::debug!(
            contract_id = %receipt.contract_id,
            tx_id = ?receipt.receipt.tx_id,
            "Local deployment included"
        );
        self.await_finality(&receipt.receipt).await?;
        Ok(receipt)
    }

    async fn call(
        &self,
        request: CallRequest,
        signer: &SigningIdentity,
    ) -> Result<TxReceipt, DeployError> {
        let receipt = self.apply_call(&request, signer.address())?;
        tracing::debug!(
            function = %request.function,
            tx_id = ?receipt.tx_id,
            "Local call included"
        );
        self.await_finality(&receipt).await?;
        Ok(receipt)
    }

    async fn contract_exists(&self, id: ContractId) -> Result<bool, DeployError> {
        let state = self.lock();
        if !state.reachable {
            return Err(DeployError::Network("local chain is unreachable".to_string()));
        }
        Ok(state.contracts.contains_key(&id))
    }
}
