//! bootstrap-deploy - Deployment library for the lending protocol contract on Fuel.
//!
//! This crate deploys the protocol contract with its owner bound at deploy time,
//! registers the protocol admin and applies the initial protocol configuration,
//! in that order, resuming from a checkpoint when a previous run was interrupted.

mod artifact;
pub use artifact::{
    AbiConfigurable, AbiFunction, ArtifactPaths, ContractAbi, ContractArtifact, DEFAULT_ABI_PATH,
    DEFAULT_BYTECODE_PATH,
};

mod checkpoint;
pub use checkpoint::{Checkpoint, CheckpointInputs, CheckpointStore};

mod config;
pub use config::{
    BOOTSTRAP_CONF_FILENAME, BootstrapConfig, DEFAULT_CHECKPOINT_PATH, NetworkTarget,
    ProtocolConfig, ProtocolParams,
};

mod error;
pub use error::DeployError;

mod identity;
pub use identity::{
    DEFAULT_DERIVATION_PATH, IdentityResolver, RecoveryPhrase, Role, RoleSecrets, SigningIdentity,
};

pub mod network;
pub use network::{GraphQlClient, LocalChain, NetworkClient};

#[cfg(feature = "fuel")]
pub use network::FuelClient;

pub mod pipeline;
pub use pipeline::Pipeline;

mod runner;
pub use runner::{BootstrapFailure, BootstrapReport, Bootstrapper, ResumeFrom};

pub mod stages;
pub use stages::{DeploymentResult, PipelineState};

mod types;
pub use types::{Address, ContractId};
