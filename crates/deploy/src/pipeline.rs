//! The three on-chain stages of the bootstrap, chained through type-state.

use rand::Rng;

use crate::{
    ContractArtifact, DeployError, SigningIdentity,
    config::ProtocolConfig,
    network::{AbiValue, CallRequest, ConfigurableOverride, DeployRequest, NetworkClient, TxReceipt},
    stages::{
        AdminGranted, ArtifactLoaded, ConfigUpdated, Deployed, DeploymentResult, NextStage,
        PipelineStage, PipelineState,
    },
    types::{Address, ContractId},
};

/// Configurable constant holding the protocol owner address.
pub const PROTOCOL_OWNER_CONFIGURABLE: &str = "PROTOCOL_OWNER";
/// Owner-only entry point registering an admin.
pub const ADD_ADMIN_FN: &str = "add_admin";
/// Admin-only entry point replacing the protocol configuration.
pub const UPDATE_PROTOCOL_CONFIG_FN: &str = "update_protocol_config";

/// Build the deployment transaction binding `owner` as `PROTOCOL_OWNER`.
///
/// The configurable data is the owner address, byte for byte.
pub fn build_deploy_request(
    artifact: &ContractArtifact,
    owner: Address,
    salt: [u8; 32],
) -> Result<DeployRequest, DeployError> {
    let data = owner.to_bytes().to_vec();
    let configurable = artifact.configurable(PROTOCOL_OWNER_CONFIGURABLE, data.len())?;

    Ok(DeployRequest {
        bytecode: artifact.bytecode().clone(),
        configurables: vec![ConfigurableOverride {
            name: configurable.name.clone(),
            offset: configurable.offset,
            data,
        }],
        salt,
    })
}

/// Build the `add_admin(admin)` call.
pub fn build_admin_grant(contract_id: ContractId, admin: Address) -> CallRequest {
    CallRequest {
        contract_id,
        function: ADD_ADMIN_FN.to_string(),
        args: vec![AbiValue::Address(admin)],
    }
}

/// Build the `update_protocol_config(config)` call.
pub fn build_config_update(contract_id: ContractId, config: &ProtocolConfig) -> CallRequest {
    CallRequest {
        contract_id,
        function: UPDATE_PROTOCOL_CONFIG_FN.to_string(),
        args: vec![config.to_abi_value()],
    }
}

/// A bootstrap pipeline positioned at stage `S`.
///
/// Transitions consume the pipeline and only exist for the next valid stage, so
/// the admin grant cannot be issued without a deployment result and the config
/// update cannot be issued without a confirmed admin grant.
pub struct Pipeline<'a, N, S> {
    network: &'a N,
    artifact: &'a ContractArtifact,
    stage: S,
}

impl<'a, N, S> Pipeline<'a, N, S>
where
    N: NetworkClient,
    S: PipelineStage,
{
    pub fn state(&self) -> PipelineState {
        S::STATE
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    fn advance(self, next: S::Next) -> Pipeline<'a, N, S::Next>
    where
        S: NextStage,
    {
        let (from, to) = (S::STATE, <S::Next as PipelineStage>::STATE);
        tracing::debug!(from = %from, to = %to, "Pipeline advanced");
        Pipeline {
            network: self.network,
            artifact: self.artifact,
            stage: next,
        }
    }
}

impl<'a, N: NetworkClient> Pipeline<'a, N, ArtifactLoaded> {
    pub fn new(network: &'a N, artifact: &'a ContractArtifact) -> Self {
        Self {
            network,
            artifact,
            stage: ArtifactLoaded,
        }
    }

    /// Deploy the contract with `owner` bound as `PROTOCOL_OWNER`, signed by `deployer`.
    ///
    /// Each call uses a fresh salt, so retrying after a failure creates a new contract.
    pub async fn deploy(
        self,
        deployer: &SigningIdentity,
        owner: Address,
    ) -> Result<Pipeline<'a, N, Deployed>, DeployError> {
        let salt: [u8; 32] = rand::rng().random();
        let request = build_deploy_request(self.artifact, owner, salt)?;

        tracing::info!(
            deployer = %deployer.address(),
            owner = %owner,
            network = %self.network.endpoint(),
            "Deploying contract..."
        );

        let receipt = self.network.deploy(request, deployer).await?;

        tracing::info!(
            contract_id = %receipt.contract_id,
            tx_id = ?receipt.receipt.tx_id,
            block_height = ?receipt.receipt.block_height,
            "Contract deployed"
        );

        Ok(self.advance(Deployed {
            deployment: DeploymentResult {
                contract_id: receipt.contract_id,
                receipt: Some(receipt.receipt),
            },
        }))
    }
}

impl<'a, N: NetworkClient> Pipeline<'a, N, Deployed> {
    /// Continue from a contract deployed earlier.
    pub fn resume(
        network: &'a N,
        artifact: &'a ContractArtifact,
        deployment: DeploymentResult,
    ) -> Self {
        tracing::info!(contract_id = %deployment.contract_id, "Resuming after deployment");
        Self {
            network,
            artifact,
            stage: Deployed { deployment },
        }
    }

    pub fn deployment(&self) -> &DeploymentResult {
        &self.stage.deployment
    }

    /// Register `admin` on the contract, signed by `owner`.
    ///
    /// No local duplicate or ownership check: the contract decides.
    pub async fn grant_admin(
        self,
        owner: &SigningIdentity,
        admin: Address,
    ) -> Result<Pipeline<'a, N, AdminGranted>, DeployError> {
        self.artifact.require_function(ADD_ADMIN_FN)?;
        let contract_id = self.stage.deployment.contract_id;

        tracing::info!(
            contract_id = %contract_id,
            owner = %owner.address(),
            admin = %admin,
            "Granting protocol admin..."
        );

        let receipt = self
            .network
            .call(build_admin_grant(contract_id, admin), owner)
            .await?;

        tracing::info!(tx_id = ?receipt.tx_id, "Protocol admin granted");

        let deployment = self.stage.deployment.clone();
        Ok(self.advance(AdminGranted {
            deployment,
            admin_grant: Some(receipt),
        }))
    }
}

impl<'a, N: NetworkClient> Pipeline<'a, N, AdminGranted> {
    /// Continue from a contract whose admin was registered earlier.
    pub fn resume(
        network: &'a N,
        artifact: &'a ContractArtifact,
        deployment: DeploymentResult,
        admin_grant: Option<TxReceipt>,
    ) -> Self {
        tracing::info!(contract_id = %deployment.contract_id, "Resuming after admin grant");
        Self {
            network,
            artifact,
            stage: AdminGranted {
                deployment,
                admin_grant,
            },
        }
    }

    pub fn deployment(&self) -> &DeploymentResult {
        &self.stage.deployment
    }

    /// Replace the on-chain protocol configuration, signed by `admin`.
    pub async fn update_config(
        self,
        admin: &SigningIdentity,
        config: &ProtocolConfig,
    ) -> Result<Pipeline<'a, N, ConfigUpdated>, DeployError> {
        self.artifact.require_function(UPDATE_PROTOCOL_CONFIG_FN)?;
        let contract_id = self.stage.deployment.contract_id;

        tracing::info!(
            contract_id = %contract_id,
            admin = %admin.address(),
            config = ?config,
            "Updating protocol config..."
        );

        let receipt = self
            .network
            .call(build_config_update(contract_id, config), admin)
            .await?;

        tracing::info!(tx_id = ?receipt.tx_id, "Protocol config updated");

        let AdminGranted {
            deployment,
            admin_grant,
        } = self.stage.clone();
        Ok(self.advance(ConfigUpdated {
            deployment,
            admin_grant,
            config_update: receipt,
        }))
    }
}

impl<N: NetworkClient> Pipeline<'_, N, ConfigUpdated> {
    /// Consume the finished pipeline.
    pub fn into_outcome(self) -> ConfigUpdated {
        self.stage
    }
}
