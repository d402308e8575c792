use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    DeployError,
    network::TxReceipt,
    stages::PipelineState,
    types::{Address, ContractId},
};

/// Inputs that identify a deployment.
///
/// A checkpoint only applies to a rerun with the same inputs: pointing the tool at
/// new bytecode, another owner or another network means a different contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInputs {
    /// Network endpoint the contract lives on.
    pub network: String,
    /// SHA-256 of the deployed bytecode.
    pub bytecode_digest: String,
    /// Address bound as `PROTOCOL_OWNER`.
    pub owner: Address,
}

impl CheckpointInputs {
    /// Compute a SHA-256 hash of these inputs.
    ///
    /// The hash is deterministic - the same inputs always produce the same hash.
    pub fn compute_hash(&self) -> String {
        let json = serde_json::to_string(self)
            .expect("CheckpointInputs serialization should never fail");

        hex::encode(Sha256::digest(json.as_bytes()))
    }
}

/// Durable record of the last confirmed stage.
///
/// Written after every confirmed stage so a rerun can skip what is already on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Hash of the [`CheckpointInputs`] this checkpoint belongs to.
    pub inputs_hash: String,
    pub inputs: CheckpointInputs,
    pub contract_id: ContractId,
    /// Last completed state.
    pub state: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_receipt: Option<TxReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_grant_receipt: Option<TxReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_update_receipt: Option<TxReceipt>,
    /// Unix timestamp of the last update.
    pub updated_at: i64,
    /// Tool version that wrote this checkpoint.
    pub tool_version: String,
}

impl Checkpoint {
    /// Create a checkpoint right after deployment.
    pub fn deployed(
        inputs: CheckpointInputs,
        contract_id: ContractId,
        receipt: Option<TxReceipt>,
    ) -> Self {
        Self {
            inputs_hash: inputs.compute_hash(),
            inputs,
            contract_id,
            state: PipelineState::Deployed,
            deployment_receipt: receipt,
            admin_grant_receipt: None,
            config_update_receipt: None,
            updated_at: chrono::Utc::now().timestamp(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Record a newly completed state.
    pub fn advance(&mut self, state: PipelineState, receipt: Option<TxReceipt>) {
        match state {
            PipelineState::AdminGranted => self.admin_grant_receipt = receipt,
            PipelineState::ConfigUpdated => self.config_update_receipt = receipt,
            _ => {}
        }
        self.state = state;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Whether this checkpoint was written for `inputs`.
    pub fn matches(&self, inputs: &CheckpointInputs) -> bool {
        self.inputs_hash == inputs.compute_hash()
    }
}

/// File-backed checkpoint storage, exclusively locked for the life of the store.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    _lock: File,
}

impl CheckpointStore {
    /// Open the store at `path`, taking an exclusive lock on `<path>.lock`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeployError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeployError::Checkpoint(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let lock_path = lock_path(&path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                DeployError::Checkpoint(format!("failed to open {}: {e}", lock_path.display()))
            })?;

        lock.try_lock_exclusive().map_err(|_| {
            DeployError::Checkpoint(format!(
                "{} is locked by another bootstrap run",
                path.display()
            ))
        })?;

        tracing::debug!(path = %path.display(), "Checkpoint store opened");

        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored checkpoint, if any.
    pub fn load(&self) -> Result<Option<Checkpoint>, DeployError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            DeployError::Checkpoint(format!("failed to read {}: {e}", self.path.display()))
        })?;

        serde_json::from_str(&content).map(Some).map_err(|e| {
            DeployError::Checkpoint(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    /// Persist `checkpoint`, replacing the previous one atomically.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), DeployError> {
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| DeployError::Checkpoint(format!("failed to serialize checkpoint: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                DeployError::Checkpoint(format!("failed to write {}: {e}", self.path.display()))
            })?;

        tracing::debug!(
            path = %self.path.display(),
            state = %checkpoint.state,
            contract_id = %checkpoint.contract_id,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Delete the stored checkpoint.
    pub fn clear(&self) -> Result<(), DeployError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                DeployError::Checkpoint(format!("failed to remove {}: {e}", self.path.display()))
            })?;
        }
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
