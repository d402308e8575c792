//! Bootstrap execution engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    ArtifactPaths, ContractArtifact, DeployError, IdentityResolver, Role, SigningIdentity,
    checkpoint::{Checkpoint, CheckpointInputs, CheckpointStore},
    config::{BootstrapConfig, ProtocolConfig, ProtocolParams},
    network::{NetworkClient, TxReceipt},
    pipeline::Pipeline,
    stages::{AdminGranted, Deployed, DeploymentResult, PipelineState},
    types::{Address, ContractId},
};

/// Start from a contract deployed earlier instead of deploying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeFrom {
    pub contract_id: ContractId,
    /// Last stage already completed on-chain.
    pub state: PipelineState,
}

/// Outcome of a successful bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub network: String,
    /// Absent when deployment was skipped.
    pub deployer: Option<Address>,
    pub owner: Address,
    /// Absent when every stage was already complete.
    pub admin: Option<Address>,
    pub contract_id: ContractId,
    pub deployment: Option<TxReceipt>,
    pub admin_grant: Option<TxReceipt>,
    pub config_update: Option<TxReceipt>,
    /// Configuration applied during this run.
    pub protocol_config: Option<ProtocolConfig>,
    /// Stage the run started after, when it resumed.
    pub resumed_from: Option<PipelineState>,
    pub state: PipelineState,
}

/// A halted run: the error, how far it got and the contract it was working on.
#[derive(Debug, Error)]
#[error("{error} (halted in state {state})")]
pub struct BootstrapFailure {
    #[source]
    pub error: DeployError,
    pub state: PipelineState,
    pub contract_id: Option<ContractId>,
}

impl BootstrapFailure {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

/// Tracks what has been confirmed so far in a run.
#[derive(Debug)]
struct Progress {
    state: PipelineState,
    checkpoint: Option<Checkpoint>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: PipelineState::Uninitialized,
            checkpoint: None,
        }
    }

    fn contract_id(&self) -> Option<ContractId> {
        self.checkpoint.as_ref().map(|c| c.contract_id)
    }

    /// Record a confirmed stage, then persist it.
    fn record(
        &mut self,
        store: Option<&CheckpointStore>,
        checkpoint: Checkpoint,
    ) -> Result<(), DeployError> {
        self.state = checkpoint.state;
        let checkpoint = self.checkpoint.insert(checkpoint);
        if let Some(store) = store {
            store.save(checkpoint)?;
        }
        Ok(())
    }

    fn advance(
        &mut self,
        store: Option<&CheckpointStore>,
        state: PipelineState,
        receipt: Option<TxReceipt>,
    ) -> Result<(), DeployError> {
        let Some(mut checkpoint) = self.checkpoint.take() else {
            return Err(DeployError::Checkpoint(format!(
                "cannot reach {state} without a deployed contract"
            )));
        };
        checkpoint.advance(state, receipt);
        self.record(store, checkpoint)
    }
}

/// Drives artifact loading, deployment, admin grant and config update in order,
/// persisting a checkpoint after each confirmed stage.
pub struct Bootstrapper<'a, N> {
    network: &'a N,
    resolver: IdentityResolver,
    artifacts: ArtifactPaths,
    protocol: ProtocolParams,
    checkpoint: Option<PathBuf>,
    redeploy: bool,
    resume_from: Option<ResumeFrom>,
}

impl<'a, N: NetworkClient> Bootstrapper<'a, N> {
    pub fn new(network: &'a N, resolver: IdentityResolver) -> Self {
        Self {
            network,
            resolver,
            artifacts: ArtifactPaths::default(),
            protocol: ProtocolParams::default(),
            checkpoint: None,
            redeploy: false,
            resume_from: None,
        }
    }

    /// Apply artifact locations, protocol parameters and the checkpoint from `config`.
    ///
    /// No checkpoint is kept when `config` targets the local network.
    pub fn from_config(
        network: &'a N,
        resolver: IdentityResolver,
        config: &BootstrapConfig,
    ) -> Self {
        let bootstrapper = Self::new(network, resolver)
            .artifacts(config.artifacts.clone())
            .protocol(config.protocol.clone());

        match config.checkpoint_path() {
            Some(path) => bootstrapper.checkpoint(path),
            None => {
                tracing::debug!(network = %config.network, "Progress is not persisted");
                bootstrapper
            }
        }
    }

    pub fn artifacts(mut self, artifacts: ArtifactPaths) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn protocol(mut self, protocol: ProtocolParams) -> Self {
        self.protocol = protocol;
        self
    }

    /// Persist progress at `path`. Without it, nothing survives the run.
    pub fn checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint = Some(path.into());
        self
    }

    /// Discard the stored checkpoint and deploy a new contract.
    ///
    /// A checkpoint written for another network is never discarded.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    /// Skip deployment and continue against `contract_id`.
    pub fn resume_from(mut self, contract_id: ContractId, state: PipelineState) -> Self {
        self.resume_from = Some(ResumeFrom { contract_id, state });
        self
    }

    /// Run every remaining stage.
    pub async fn run(&self) -> Result<BootstrapReport, BootstrapFailure> {
        let mut progress = Progress::new();

        match self.execute(&mut progress).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let failure = BootstrapFailure {
                    error,
                    state: progress.state,
                    contract_id: progress.contract_id(),
                };
                tracing::error!(
                    error = %failure.error,
                    state = %failure.state,
                    contract_id = ?failure.contract_id,
                    exit_code = failure.exit_code(),
                    "Bootstrap halted"
                );
                Err(failure)
            }
        }
    }

    async fn execute(&self, progress: &mut Progress) -> Result<BootstrapReport, DeployError> {
        if self.redeploy && self.resume_from.is_some() {
            return Err(DeployError::Configuration(
                "redeploy and resume are mutually exclusive".to_string(),
            ));
        }

        let artifact = ContractArtifact::load(&self.artifacts)?;
        progress.state = PipelineState::ArtifactLoaded;

        let owner = self.resolver.resolve(Role::Owner)?;
        let inputs = CheckpointInputs {
            network: self.network.endpoint(),
            bytecode_digest: artifact.digest(),
            owner: owner.address(),
        };

        let store = self
            .checkpoint
            .as_ref()
            .map(CheckpointStore::open)
            .transpose()?;

        let start = self.starting_point(store.as_ref(), &inputs)?;
        let resumed_from = start.as_ref().map(|c| c.state);

        let mut deployer = None;
        let mut admin = None;
        let mut protocol_config = None;

        match start {
            None => {
                let identity = self.resolver.resolve(Role::Deployer)?;
                deployer = Some(identity.address());

                let deployed = Pipeline::new(self.network, &artifact)
                    .deploy(&identity, owner.address())
                    .await?;
                let deployment = deployed.deployment();
                progress.record(
                    store.as_ref(),
                    Checkpoint::deployed(
                        inputs,
                        deployment.contract_id,
                        deployment.receipt.clone(),
                    ),
                )?;

                let (identity, config) = self
                    .grant_and_configure(deployed, &owner, store.as_ref(), progress)
                    .await?;
                admin = Some(identity);
                protocol_config = Some(config);
            }
            Some(checkpoint) => {
                self.ensure_deployed(checkpoint.contract_id).await?;
                let deployment = DeploymentResult {
                    contract_id: checkpoint.contract_id,
                    receipt: checkpoint.deployment_receipt.clone(),
                };
                let admin_grant = checkpoint.admin_grant_receipt.clone();
                let state = checkpoint.state;
                progress.record(store.as_ref(), checkpoint)?;

                match state {
                    PipelineState::Deployed => {
                        let pipeline =
                            Pipeline::<_, Deployed>::resume(self.network, &artifact, deployment);
                        let (identity, config) = self
                            .grant_and_configure(pipeline, &owner, store.as_ref(), progress)
                            .await?;
                        admin = Some(identity);
                        protocol_config = Some(config);
                    }
                    PipelineState::AdminGranted => {
                        let identity = self.resolver.resolve(Role::Admin)?;
                        let pipeline = Pipeline::<_, AdminGranted>::resume(
                            self.network,
                            &artifact,
                            deployment,
                            admin_grant,
                        );
                        protocol_config = Some(
                            self.configure(pipeline, &identity, store.as_ref(), progress)
                                .await?,
                        );
                        admin = Some(identity.address());
                    }
                    _ => {
                        tracing::info!(
                            contract_id = %deployment.contract_id,
                            "Bootstrap already complete"
                        );
                    }
                }
            }
        }

        let checkpoint = progress.checkpoint.as_ref().ok_or_else(|| {
            DeployError::Checkpoint("run finished without a deployed contract".to_string())
        })?;

        tracing::info!(
            contract_id = %checkpoint.contract_id,
            state = %checkpoint.state,
            "Bootstrap complete"
        );

        Ok(BootstrapReport {
            network: self.network.endpoint(),
            deployer,
            owner: owner.address(),
            admin,
            contract_id: checkpoint.contract_id,
            deployment: checkpoint.deployment_receipt.clone(),
            admin_grant: checkpoint.admin_grant_receipt.clone(),
            config_update: checkpoint.config_update_receipt.clone(),
            protocol_config,
            resumed_from,
            state: checkpoint.state,
        })
    }

    /// Decide where to start: an explicit resume, a matching checkpoint or a fresh deployment.
    fn starting_point(
        &self,
        store: Option<&CheckpointStore>,
        inputs: &CheckpointInputs,
    ) -> Result<Option<Checkpoint>, DeployError> {
        if let Some(resume) = self.resume_from {
            let mut checkpoint = Checkpoint::deployed(inputs.clone(), resume.contract_id, None);
            match resume.state {
                PipelineState::Deployed => {}
                PipelineState::AdminGranted | PipelineState::ConfigUpdated => {
                    checkpoint.advance(PipelineState::AdminGranted, None);
                    checkpoint.advance(resume.state, None);
                }
                other => {
                    return Err(DeployError::Configuration(format!(
                        "cannot resume from state {other}; expected deployed or admin-granted"
                    )));
                }
            }
            tracing::info!(
                contract_id = %resume.contract_id,
                state = %resume.state,
                "Resuming from operator input"
            );
            return Ok(Some(checkpoint));
        }

        let Some(store) = store else {
            return Ok(None);
        };
        let Some(stored) = store.load()? else {
            return Ok(None);
        };

        if stored.inputs.network != inputs.network {
            return Err(DeployError::Checkpoint(format!(
                "{} tracks contract {} on {}; use another checkpoint path for {}",
                store.path().display(),
                stored.contract_id,
                stored.inputs.network,
                inputs.network
            )));
        }

        if self.redeploy {
            tracing::warn!(
                contract_id = %stored.contract_id,
                state = %stored.state,
                "Discarding checkpoint, deploying a new contract"
            );
            store.clear()?;
            return Ok(None);
        }

        if !stored.matches(inputs) {
            return Err(DeployError::Checkpoint(format!(
                "checkpoint for contract {} was written for owner {} and other inputs; \
                 pass --redeploy to start over",
                stored.contract_id, stored.inputs.owner
            )));
        }

        tracing::info!(
            contract_id = %stored.contract_id,
            state = %stored.state,
            updated_at = stored.updated_at,
            "Resuming from checkpoint"
        );
        Ok(Some(stored))
    }

    async fn ensure_deployed(&self, contract_id: ContractId) -> Result<(), DeployError> {
        if self.network.contract_exists(contract_id).await? {
            Ok(())
        } else {
            Err(DeployError::Checkpoint(format!(
                "contract {contract_id} not found on {}",
                self.network.endpoint()
            )))
        }
    }

    async fn grant_and_configure(
        &self,
        pipeline: Pipeline<'_, N, Deployed>,
        owner: &SigningIdentity,
        store: Option<&CheckpointStore>,
        progress: &mut Progress,
    ) -> Result<(Address, ProtocolConfig), DeployError> {
        // Resolved only now, so a missing admin secret halts after deployment.
        let admin = self.resolver.resolve(Role::Admin)?;

        let granted = pipeline.grant_admin(owner, admin.address()).await?;
        let receipt = granted.stage().admin_grant.clone();
        progress.advance(store, PipelineState::AdminGranted, receipt)?;

        let config = self.configure(granted, &admin, store, progress).await?;
        Ok((admin.address(), config))
    }

    async fn configure(
        &self,
        pipeline: Pipeline<'_, N, AdminGranted>,
        admin: &SigningIdentity,
        store: Option<&CheckpointStore>,
        progress: &mut Progress,
    ) -> Result<ProtocolConfig, DeployError> {
        let config = self.protocol.resolve(admin.address());

        let outcome = pipeline.update_config(admin, &config).await?.into_outcome();
        progress.advance(store, PipelineState::ConfigUpdated, Some(outcome.config_update))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalChain, artifact::tests::DUMMY_ABI, identity::tests::all_secrets};
    use tempdir::TempDir;

    fn artifact_paths(dir: &TempDir) -> ArtifactPaths {
        let paths = ArtifactPaths {
            bytecode: dir.path().join("core.bin"),
            abi: dir.path().join("core-abi.json"),
        };
        std::fs::write(&paths.bytecode, [0x42u8; 96]).unwrap();
        std::fs::write(&paths.abi, DUMMY_ABI).unwrap();
        paths
    }

    #[tokio::test]
    async fn test_missing_artifact_halts_uninitialized() {
        let dir = TempDir::new("bootstrap-runner").unwrap();
        let chain = LocalChain::new();

        let failure = Bootstrapper::new(&chain, IdentityResolver::new(all_secrets()))
            .artifacts(ArtifactPaths {
                bytecode: dir.path().join("missing.bin"),
                abi: dir.path().join("missing.json"),
            })
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::ArtifactNotFound { .. }));
        assert_eq!(failure.state, PipelineState::Uninitialized);
        assert_eq!(failure.exit_code(), 3);
        assert!(chain.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_owner_halts_before_any_transaction() {
        let dir = TempDir::new("bootstrap-runner").unwrap();
        let chain = LocalChain::new();

        let failure = Bootstrapper::new(
            &chain,
            IdentityResolver::new(all_secrets().without(Role::Owner)),
        )
        .artifacts(artifact_paths(&dir))
        .run()
        .await
        .unwrap_err();

        assert!(matches!(failure.error, DeployError::Configuration(_)));
        assert_eq!(failure.state, PipelineState::ArtifactLoaded);
        assert!(failure.contract_id.is_none());
        assert!(chain.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_redeploy_and_resume_conflict() {
        let dir = TempDir::new("bootstrap-runner").unwrap();
        let chain = LocalChain::new();

        let failure = Bootstrapper::new(&chain, IdentityResolver::new(all_secrets()))
            .artifacts(artifact_paths(&dir))
            .redeploy(true)
            .resume_from(ContractId::from([1u8; 32]), PipelineState::Deployed)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resume_rejects_unknown_contract() {
        let dir = TempDir::new("bootstrap-runner").unwrap();
        let chain = LocalChain::new();

        let failure = Bootstrapper::new(&chain, IdentityResolver::new(all_secrets()))
            .artifacts(artifact_paths(&dir))
            .resume_from(ContractId::from([1u8; 32]), PipelineState::Deployed)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::Checkpoint(_)));
        assert_eq!(failure.state, PipelineState::ArtifactLoaded);
        assert!(chain.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_resume_from_invalid_state() {
        let dir = TempDir::new("bootstrap-runner").unwrap();
        let chain = LocalChain::new();

        let failure = Bootstrapper::new(&chain, IdentityResolver::new(all_secrets()))
            .artifacts(artifact_paths(&dir))
            .resume_from(ContractId::from([1u8; 32]), PipelineState::ArtifactLoaded)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DeployError::Configuration(_)));
    }
}
