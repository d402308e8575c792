//! Fuel node client backed by the `fuels` SDK.

use std::time::Duration;

use alloy_core::primitives::B256;
use fuels::{
    core::codec::{EncoderConfig, LogDecoder, encode_fn_selector},
    crypto::SecretKey,
    prelude::{Contract, Provider, TxPolicies, WalletUnlocked},
    programs::calls::CallHandler,
    types::{
        ContractId as FuelContractId, Salt, Token, bech32::Bech32ContractId,
        errors::{Error as FuelsError, transaction::Reason},
    },
};
use url::Url;

use super::{
    AbiValue, CallRequest, DEFAULT_FINALITY_TIMEOUT, DeployReceipt, DeployRequest, GraphQlClient,
    NetworkClient, TxReceipt,
};
use crate::{DeployError, SigningIdentity, artifact::byte_span, types::ContractId};

/// Signs and submits transactions to a Fuel node.
#[derive(Debug, Clone)]
pub struct FuelClient {
    provider: Provider,
    graphql: GraphQlClient,
    finality_timeout: Duration,
}

impl FuelClient {
    /// Connect to the node at `url`.
    pub async fn connect(url: Url) -> Result<Self, DeployError> {
        let graphql = GraphQlClient::new(url.clone())?;
        let provider = Provider::connect(url.as_str())
            .await
            .map_err(|e| DeployError::Network(format!("failed to connect to {url}: {e}")))?;

        Ok(Self {
            provider,
            graphql,
            finality_timeout: DEFAULT_FINALITY_TIMEOUT,
        })
    }

    /// Give up waiting for a transaction to be committed after `timeout`.
    pub fn with_finality_timeout(mut self, timeout: Duration) -> Self {
        self.finality_timeout = timeout;
        self
    }

    fn wallet(&self, signer: &SigningIdentity) -> Result<WalletUnlocked, DeployError> {
        let secret = SecretKey::try_from(signer.secret_key_bytes().as_slice()).map_err(|e| {
            DeployError::Configuration(format!(
                "{} key rejected by the Fuel SDK: {e}",
                signer.role()
            ))
        })?;
        Ok(WalletUnlocked::new_from_private_key(
            secret,
            Some(self.provider.clone()),
        ))
    }

    async fn within_finality<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, DeployError>>,
    ) -> Result<T, DeployError> {
        tokio::time::timeout(self.finality_timeout, fut)
            .await
            .map_err(|_| {
                DeployError::FinalityTimeout(format!(
                    "{what} not committed after {}s",
                    self.finality_timeout.as_secs()
                ))
            })?
    }
}

/// Write every configurable override into a copy of the bytecode.
fn apply_configurables(request: &DeployRequest) -> Result<Vec<u8>, DeployError> {
    let mut code = request.bytecode.to_vec();
    for configurable in &request.configurables {
        let slot = byte_span(configurable.offset, configurable.data.len())
            .and_then(|span| code.get_mut(span))
            .ok_or_else(|| {
                DeployError::Deployment(format!(
                    "configurable '{}' does not fit in the bytecode",
                    configurable.name
                ))
            })?;
        slot.copy_from_slice(&configurable.data);
    }
    Ok(code)
}

fn to_token(value: &AbiValue) -> Token {
    match value {
        AbiValue::Address(address) => Token::Struct(vec![Token::B256(address.to_bytes())]),
        AbiValue::U64(n) => Token::U64(*n),
        AbiValue::Struct(fields) => {
            Token::Struct(fields.iter().map(|(_, v)| to_token(v)).collect())
        }
    }
}

/// Map an SDK failure onto the pipeline's error kinds.
fn classify(error: FuelsError, fallback: fn(String) -> DeployError) -> DeployError {
    match error {
        FuelsError::Provider(message) => DeployError::Network(message),
        FuelsError::Transaction(Reason::Reverted { reason, .. }) => {
            let lowered = reason.to_lowercase();
            if ["owner", "admin", "auth"].iter().any(|k| lowered.contains(k)) {
                DeployError::Authorization(reason)
            } else {
                DeployError::Reverted(reason)
            }
        }
        other => fallback(other.to_string()),
    }
}

impl NetworkClient for FuelClient {
    fn endpoint(&self) -> String {
        self.graphql.url().to_string()
    }

    async fn deploy(
        &self,
        request: DeployRequest,
        signer: &SigningIdentity,
    ) -> Result<DeployReceipt, DeployError> {
        let wallet = self.wallet(signer)?;
        let code = apply_configurables(&request)?;
        let contract = Contract::regular(code, Salt::from(request.salt), vec![]);

        let contract_id = self
            .within_finality("deployment", async {
                contract
                    .deploy(&wallet, TxPolicies::default())
                    .await
                    .map_err(|e| classify(e, DeployError::Deployment))
            })
            .await?;

        let id: FuelContractId = (&contract_id).into();
        let block_height = self.graphql.chain_info().await.ok().map(|info| info.latest_height);

        Ok(DeployReceipt {
            contract_id: ContractId::from(*id),
            receipt: TxReceipt {
                tx_id: None,
                block_height,
            },
        })
    }

    async fn call(
        &self,
        request: CallRequest,
        signer: &SigningIdentity,
    ) -> Result<TxReceipt, DeployError> {
        let wallet = self.wallet(signer)?;
        let contract_id =
            Bech32ContractId::from(FuelContractId::new(request.contract_id.to_bytes()));
        let args: Vec<Token> = request.args.iter().map(to_token).collect();

        let handler: CallHandler<_, _, ()> = CallHandler::new_contract_call(
            contract_id,
            wallet,
            encode_fn_selector(&request.function),
            &args,
            LogDecoder::default(),
            false,
            EncoderConfig::default(),
        );

        let response = self
            .within_finality(&request.function, async {
                handler
                    .call()
                    .await
                    .map_err(|e| classify(e, DeployError::Reverted))
            })
            .await?;

        Ok(TxReceipt {
            tx_id: response.tx_id.map(|id| B256::from(*id)),
            block_height: None,
        })
    }

    async fn contract_exists(&self, id: ContractId) -> Result<bool, DeployError> {
        self.graphql.contract_exists(id).await
    }
}
