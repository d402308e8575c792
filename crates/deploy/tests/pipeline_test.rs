//! Integration tests for bootstrap-deploy.
//!
//! Every test runs the full bootstrap against the in-memory `LocalChain` or a
//! recording fake network, with artifacts and checkpoints in a temporary directory.

use std::{sync::Mutex, time::Duration};

use bootstrap_deploy::{
    ArtifactPaths, BootstrapConfig, Bootstrapper, Checkpoint, CheckpointInputs, CheckpointStore,
    ContractArtifact, ContractId, DeployError, IdentityResolver, LocalChain, NetworkClient,
    NetworkTarget, Pipeline, PipelineState, ProtocolParams, Role, RoleSecrets, SigningIdentity,
    network::{
        AbiValue, CallRequest, DeployReceipt, DeployRequest, TESTNET_GRAPHQL_URL, TxAction,
        TxReceipt,
    },
    pipeline::{ADD_ADMIN_FN, UPDATE_PROTOCOL_CONFIG_FN},
    stages::Deployed,
};
use tempdir::TempDir;

const DEPLOYER_PHRASE: &str = "test test test test test test test test test test test junk";
const OWNER_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const ADMIN_PHRASE: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";
const OTHER_PHRASE: &str =
    "letter advice cage absurd amount doctor acoustic avoid letter advice cage above";

const ABI: &str = r#"{
    "programType": "contract",
    "specVersion": "1",
    "encodingVersion": "1",
    "concreteTypes": [],
    "metadataTypes": [],
    "functions": [
        { "name": "add_admin", "inputs": [], "output": "()" },
        { "name": "update_protocol_config", "inputs": [], "output": "()" },
        { "name": "get_protocol_config", "inputs": [], "output": "()" }
    ],
    "loggedTypes": [],
    "messagesTypes": [],
    "configurables": [
        { "name": "PROTOCOL_OWNER", "concreteTypeId": "ab", "offset": 40 }
    ]
}"#;

/// Test setup: artifacts on disk, a checkpoint path and the three role secrets.
struct TestContext {
    dir: TempDir,
    artifacts: ArtifactPaths,
}

impl TestContext {
    fn new() -> Self {
        let dir = TempDir::new("bootstrap-pipeline").expect("Failed to create temp dir");
        let artifacts = ArtifactPaths {
            bytecode: dir.path().join("axios-fuel-core.bin"),
            abi: dir.path().join("axios-fuel-core-abi.json"),
        };
        std::fs::write(&artifacts.bytecode, [0x5Au8; 128]).expect("Failed to write bytecode");
        std::fs::write(&artifacts.abi, ABI).expect("Failed to write ABI");

        Self { dir, artifacts }
    }

    fn checkpoint(&self) -> std::path::PathBuf {
        self.dir.path().join("out").join("bootstrap-checkpoint.json")
    }

    fn bootstrapper<'a, N: NetworkClient>(
        &self,
        network: &'a N,
        secrets: RoleSecrets,
    ) -> Bootstrapper<'a, N> {
        Bootstrapper::new(network, IdentityResolver::new(secrets))
            .artifacts(self.artifacts.clone())
            .checkpoint(self.checkpoint())
    }
}

fn secrets() -> RoleSecrets {
    RoleSecrets::default()
        .with(Role::Deployer, DEPLOYER_PHRASE)
        .with(Role::Owner, OWNER_PHRASE)
        .with(Role::Admin, ADMIN_PHRASE)
}

fn identity(role: Role) -> SigningIdentity {
    IdentityResolver::new(secrets())
        .resolve(role)
        .expect("test phrases are valid")
}

fn stored_state(ctx: &TestContext) -> Option<PipelineState> {
    CheckpointStore::open(ctx.checkpoint())
        .expect("Failed to open checkpoint store")
        .load()
        .expect("Failed to load checkpoint")
        .map(|c| c.state)
}

#[tokio::test]
async fn test_full_bootstrap_on_local_chain() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();
    let (a1, a2, a3) = (
        identity(Role::Deployer).address(),
        identity(Role::Owner).address(),
        identity(Role::Admin).address(),
    );
    assert!(a1 != a2 && a2 != a3 && a1 != a3, "roles must derive distinct addresses");

    let report = ctx
        .bootstrapper(&chain, secrets())
        .run()
        .await
        .expect("bootstrap should succeed");

    assert_eq!(report.state, PipelineState::ConfigUpdated);
    assert_eq!(report.deployer, Some(a1));
    assert_eq!(report.owner, a2);
    assert_eq!(report.admin, Some(a3));
    assert!(report.resumed_from.is_none());
    assert!(report.deployment.is_some());
    assert!(report.admin_grant.is_some());
    assert!(report.config_update.is_some());

    let contract = chain.contract(&report.contract_id).expect("contract deployed");
    assert_eq!(contract.owner, a2);
    assert!(contract.admins.contains(&a3));

    let config = contract.protocol_config.expect("config applied");
    assert_eq!(config.field("protocol_fee_receiver"), Some(&AbiValue::Address(a3)));
    assert_eq!(config.field("protocol_fee"), Some(&AbiValue::U64(100)));
    assert_eq!(config.field("protocol_liquidation_fee"), Some(&AbiValue::U64(100)));
    assert_eq!(config.field("liquidator_fee"), Some(&AbiValue::U64(100)));
    assert_eq!(config.field("time_request_loan_expires"), Some(&AbiValue::U64(28800)));
    assert_eq!(config.field("oracle_max_stale"), Some(&AbiValue::U64(30)));
    assert_eq!(config.field("min_loan_duration"), Some(&AbiValue::U64(600)));

    // Deployer deploys, owner grants, admin configures.
    let txs = chain.transactions();
    assert_eq!(txs.len(), 3);
    assert!(txs.iter().all(|tx| tx.accepted));
    assert_eq!(txs[0].signer, a1);
    assert!(matches!(
        &txs[0].action,
        TxAction::Deploy { configurables } if configurables[0].data == a2.to_bytes().to_vec()
    ));
    assert_eq!(txs[1].signer, a2);
    assert!(matches!(&txs[1].action, TxAction::Call { function, .. } if function == ADD_ADMIN_FN));
    assert_eq!(txs[2].signer, a3);
    assert!(matches!(
        &txs[2].action,
        TxAction::Call { function, .. } if function == UPDATE_PROTOCOL_CONFIG_FN
    ));

    assert_eq!(stored_state(&ctx), Some(PipelineState::ConfigUpdated));
}

#[tokio::test]
async fn test_missing_admin_halts_after_deployment() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();

    let failure = ctx
        .bootstrapper(&chain, secrets().without(Role::Admin))
        .run()
        .await
        .expect_err("bootstrap should halt without an admin secret");

    assert!(matches!(
        failure.error,
        DeployError::Configuration(ref m) if m.contains("PROTOCOL_ADMIN")
    ));
    assert_eq!(failure.state, PipelineState::Deployed);
    assert_eq!(failure.exit_code(), 2);

    let contract_id = failure.contract_id.expect("contract was deployed");
    let contract = chain.contract(&contract_id).expect("contract exists");
    assert!(contract.admins.is_empty());
    assert!(contract.protocol_config.is_none());
    assert_eq!(stored_state(&ctx), Some(PipelineState::Deployed));

    // Supplying the admin resumes without a second deployment.
    let report = ctx
        .bootstrapper(&chain, secrets())
        .run()
        .await
        .expect("resumed bootstrap should succeed");

    assert_eq!(report.contract_id, contract_id);
    assert_eq!(report.resumed_from, Some(PipelineState::Deployed));
    assert!(report.deployer.is_none());
    assert_eq!(chain.contract_count(), 1);
    assert_eq!(chain.transactions().len(), 3);
}

#[tokio::test]
async fn test_completed_bootstrap_is_not_repeated() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();

    let first = ctx.bootstrapper(&chain, secrets()).run().await.unwrap();
    let second = ctx.bootstrapper(&chain, secrets()).run().await.unwrap();

    assert_eq!(first.contract_id, second.contract_id);
    assert_eq!(second.resumed_from, Some(PipelineState::ConfigUpdated));
    assert_eq!(second.state, PipelineState::ConfigUpdated);
    assert!(second.protocol_config.is_none());
    assert_eq!(chain.transactions().len(), 3);
}

#[tokio::test]
async fn test_redeploy_yields_new_contract() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();

    let first = ctx.bootstrapper(&chain, secrets()).run().await.unwrap();
    let second = ctx
        .bootstrapper(&chain, secrets())
        .redeploy(true)
        .run()
        .await
        .unwrap();

    assert_ne!(first.contract_id, second.contract_id);
    assert_eq!(chain.contract_count(), 2);
    assert!(second.resumed_from.is_none());
}

#[tokio::test]
async fn test_checkpoint_for_other_owner_is_rejected() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();

    ctx.bootstrapper(&chain, secrets()).run().await.unwrap();

    let other_owner = secrets().with(Role::Owner, OTHER_PHRASE);
    let failure = ctx
        .bootstrapper(&chain, other_owner.clone())
        .run()
        .await
        .expect_err("checkpoint belongs to another owner");
    assert!(matches!(failure.error, DeployError::Checkpoint(_)));
    assert_eq!(failure.exit_code(), 9);
    assert_eq!(chain.contract_count(), 1);

    let report = ctx
        .bootstrapper(&chain, other_owner)
        .redeploy(true)
        .run()
        .await
        .unwrap();
    assert_eq!(chain.contract(&report.contract_id).unwrap().owner, report.owner);
    assert_eq!(chain.contract_count(), 2);
}

#[tokio::test]
async fn test_repeated_local_runs_start_fresh() {
    let ctx = TestContext::new();
    let config = BootstrapConfig {
        network: NetworkTarget::Local,
        checkpoint: ctx.checkpoint(),
        artifacts: ctx.artifacts.clone(),
        ..Default::default()
    };

    // Each run gets its own chain, as each process does.
    for _ in 0..2 {
        let chain = LocalChain::new();
        let report = Bootstrapper::from_config(&chain, IdentityResolver::new(secrets()), &config)
            .run()
            .await
            .expect("local bootstrap should succeed");

        assert_eq!(report.state, PipelineState::ConfigUpdated);
        assert!(report.resumed_from.is_none());
        assert_eq!(chain.contract_count(), 1);
    }

    assert!(!ctx.checkpoint().exists());
}

#[tokio::test]
async fn test_checkpoint_for_other_network_is_never_discarded() {
    let ctx = TestContext::new();
    let artifact = ContractArtifact::load(&ctx.artifacts).unwrap();
    let remote = Checkpoint::deployed(
        CheckpointInputs {
            network: TESTNET_GRAPHQL_URL.to_string(),
            bytecode_digest: artifact.digest(),
            owner: identity(Role::Owner).address(),
        },
        ContractId::from([0x83u8; 32]),
        None,
    );
    CheckpointStore::open(ctx.checkpoint())
        .unwrap()
        .save(&remote)
        .unwrap();
    let before = std::fs::read(ctx.checkpoint()).unwrap();

    for redeploy in [false, true] {
        let chain = LocalChain::new();
        let failure = ctx
            .bootstrapper(&chain, secrets())
            .redeploy(redeploy)
            .run()
            .await
            .expect_err("checkpoint belongs to another network");

        assert!(matches!(failure.error, DeployError::Checkpoint(ref m) if m.contains("testnet")));
        assert_eq!(failure.exit_code(), 9);
        assert_eq!(failure.state, PipelineState::ArtifactLoaded);
        assert!(chain.transactions().is_empty());
    }

    assert_eq!(std::fs::read(ctx.checkpoint()).unwrap(), before);
}

#[tokio::test]
async fn test_failed_redeploy_does_not_resume_discarded_contract() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();

    let first = ctx.bootstrapper(&chain, secrets()).run().await.unwrap();
    chain.drain(identity(Role::Deployer).address());

    let failure = ctx
        .bootstrapper(&chain, secrets())
        .redeploy(true)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(failure.error, DeployError::Deployment(_)));
    assert_eq!(stored_state(&ctx), None);
    assert!(chain.contract(&first.contract_id).is_some());
}

#[tokio::test]
async fn test_manual_resume_after_admin_grant() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();
    let artifact = ContractArtifact::load(&ctx.artifacts).unwrap();
    let owner = identity(Role::Owner);
    let admin = identity(Role::Admin);

    let granted = Pipeline::new(&chain, &artifact)
        .deploy(&identity(Role::Deployer), owner.address())
        .await
        .unwrap()
        .grant_admin(&owner, admin.address())
        .await
        .unwrap();
    let contract_id = granted.deployment().contract_id;

    let report = ctx
        .bootstrapper(&chain, secrets())
        .protocol(ProtocolParams {
            oracle_max_stale: 45,
            ..Default::default()
        })
        .resume_from(contract_id, PipelineState::AdminGranted)
        .run()
        .await
        .unwrap();

    assert_eq!(report.contract_id, contract_id);
    assert_eq!(report.state, PipelineState::ConfigUpdated);
    assert_eq!(report.protocol_config.unwrap().oracle_max_stale, 45);

    let txs = chain.transactions();
    assert_eq!(txs.len(), 3, "only the config update is sent on resume");
    assert!(matches!(
        &txs[2].action,
        TxAction::Call { function, .. } if function == UPDATE_PROTOCOL_CONFIG_FN
    ));
}

#[tokio::test]
async fn test_regranting_existing_admin_is_accepted() {
    let chain = LocalChain::new();
    let ctx = TestContext::new();
    let artifact = ContractArtifact::load(&ctx.artifacts).unwrap();
    let owner = identity(Role::Owner);
    let admin = identity(Role::Admin);

    let deployed = Pipeline::new(&chain, &artifact)
        .deploy(&identity(Role::Deployer), owner.address())
        .await
        .unwrap();
    let deployment = deployed.deployment().clone();
    deployed.grant_admin(&owner, admin.address()).await.unwrap();

    Pipeline::<_, Deployed>::resume(&chain, &artifact, deployment.clone())
        .grant_admin(&owner, admin.address())
        .await
        .expect("granting an existing admin again should not fail");

    assert_eq!(chain.contract(&deployment.contract_id).unwrap().admins.len(), 1);
}

#[tokio::test]
async fn test_grant_signed_by_non_owner_is_unauthorized() {
    let chain = LocalChain::new();
    let ctx = TestContext::new();
    let artifact = ContractArtifact::load(&ctx.artifacts).unwrap();
    let deployer = identity(Role::Deployer);

    let err = Pipeline::new(&chain, &artifact)
        .deploy(&deployer, identity(Role::Owner).address())
        .await
        .unwrap()
        .grant_admin(&deployer, identity(Role::Admin).address())
        .await
        .err()
        .expect("deployer is not the owner");

    assert!(matches!(err, DeployError::Authorization(_)));
    assert_eq!(err.exit_code(), 6);
}

#[tokio::test]
async fn test_slow_finality_reports_timeout() {
    let ctx = TestContext::new();
    let chain = LocalChain::new()
        .with_finality_delay(Duration::from_millis(200))
        .with_finality_timeout(Duration::from_millis(10));

    let failure = ctx.bootstrapper(&chain, secrets()).run().await.unwrap_err();

    assert!(matches!(failure.error, DeployError::FinalityTimeout(_)));
    assert_eq!(failure.state, PipelineState::ArtifactLoaded);
    assert_eq!(failure.exit_code(), 7);
}

#[tokio::test]
async fn test_unreachable_network() {
    let ctx = TestContext::new();
    let chain = LocalChain::new();
    chain.set_reachable(false);

    let failure = ctx.bootstrapper(&chain, secrets()).run().await.unwrap_err();

    assert!(matches!(failure.error, DeployError::Network(_)));
    assert_eq!(failure.exit_code(), 8);
    assert_eq!(stored_state(&ctx), None);
}

/// Records the order of submitted transactions and fails a chosen function.
#[derive(Default)]
struct RecordingNetwork {
    log: Mutex<Vec<String>>,
    reject: Option<&'static str>,
}

impl RecordingNetwork {
    fn rejecting(function: &'static str) -> Self {
        Self {
            reject: Some(function),
            ..Default::default()
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn receipt() -> TxReceipt {
        TxReceipt {
            tx_id: None,
            block_height: None,
        }
    }
}

impl NetworkClient for RecordingNetwork {
    fn endpoint(&self) -> String {
        "recording".to_string()
    }

    async fn deploy(
        &self,
        _request: DeployRequest,
        signer: &SigningIdentity,
    ) -> Result<DeployReceipt, DeployError> {
        self.log.lock().unwrap().push(format!("deploy:{}", signer.role()));
        Ok(DeployReceipt {
            contract_id: ContractId::from([0xC0u8; 32]),
            receipt: Self::receipt(),
        })
    }

    async fn call(
        &self,
        request: CallRequest,
        signer: &SigningIdentity,
    ) -> Result<TxReceipt, DeployError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", request.function, signer.role()));
        if self.reject == Some(request.function.as_str()) {
            return Err(DeployError::Authorization(format!("{} rejected", request.function)));
        }
        Ok(Self::receipt())
    }

    async fn contract_exists(&self, _id: ContractId) -> Result<bool, DeployError> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_stages_run_in_order_with_their_signers() {
    let ctx = TestContext::new();
    let network = RecordingNetwork::default();

    let report = ctx.bootstrapper(&network, secrets()).run().await.unwrap();

    assert_eq!(report.state, PipelineState::ConfigUpdated);
    assert_eq!(
        network.log(),
        [
            "deploy:deployer",
            "add_admin:owner",
            "update_protocol_config:admin"
        ]
    );
}

#[tokio::test]
async fn test_rejected_grant_blocks_config_update() {
    let ctx = TestContext::new();
    let network = RecordingNetwork::rejecting(ADD_ADMIN_FN);

    let failure = ctx.bootstrapper(&network, secrets()).run().await.unwrap_err();

    assert!(matches!(failure.error, DeployError::Authorization(_)));
    assert_eq!(failure.state, PipelineState::Deployed);
    assert_eq!(failure.contract_id, Some(ContractId::from([0xC0u8; 32])));
    assert_eq!(network.log(), ["deploy:deployer", "add_admin:owner"]);
}
