//! Compiled contract artifacts: bytecode plus its ABI description.

use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DeployError;

/// Default location of the compiled contract bytecode.
pub const DEFAULT_BYTECODE_PATH: &str = "./out/debug/axios-fuel-core.bin";
/// Default location of the contract ABI.
pub const DEFAULT_ABI_PATH: &str = "./out/debug/axios-fuel-core-abi.json";

/// Filesystem locations of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    /// Path to the `.bin` bytecode file.
    pub bytecode: PathBuf,
    /// Path to the ABI JSON file.
    pub abi: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            bytecode: PathBuf::from(DEFAULT_BYTECODE_PATH),
            abi: PathBuf::from(DEFAULT_ABI_PATH),
        }
    }
}

/// A function exported by the contract ABI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiFunction {
    pub name: String,
}

/// A configurable constant and its byte offset in the bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiConfigurable {
    pub name: String,
    pub offset: u64,
}

/// The parts of the ABI the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAbi {
    #[serde(default)]
    pub program_type: Option<String>,
    pub functions: Vec<AbiFunction>,
    #[serde(default)]
    pub configurables: Vec<AbiConfigurable>,
}

/// Immutable bytecode and ABI pair, loaded once per run.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    bytecode: Bytes,
    abi: ContractAbi,
    paths: ArtifactPaths,
}

impl ContractArtifact {
    /// Load the artifact from disk.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, DeployError> {
        let bytecode = read_existing(&paths.bytecode)?;
        let abi_raw = read_existing(&paths.abi)?;

        let artifact = Self::from_parts(bytecode, &abi_raw, paths.clone())?;

        tracing::info!(
            bytecode = %paths.bytecode.display(),
            abi = %paths.abi.display(),
            size = artifact.bytecode.len(),
            digest = %artifact.digest(),
            "Loaded contract artifact"
        );

        Ok(artifact)
    }

    /// Build an artifact from bytes already in memory.
    pub fn from_parts(
        bytecode: impl Into<Bytes>,
        abi_json: &[u8],
        paths: ArtifactPaths,
    ) -> Result<Self, DeployError> {
        let bytecode = bytecode.into();
        if bytecode.is_empty() {
            return Err(DeployError::artifact_format(&paths.bytecode, "bytecode is empty"));
        }

        let abi: ContractAbi = serde_json::from_slice(abi_json)
            .map_err(|e| DeployError::artifact_format(&paths.abi, e))?;

        if let Some(program_type) = &abi.program_type {
            if program_type != "contract" {
                return Err(DeployError::artifact_format(
                    &paths.abi,
                    format!("expected a contract ABI, found program type '{program_type}'"),
                ));
            }
        }

        Ok(Self {
            bytecode,
            abi,
            paths,
        })
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    pub fn abi(&self) -> &ContractAbi {
        &self.abi
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Hex-encoded SHA-256 of the bytecode.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytecode))
    }

    /// Ensure the ABI exports `name`.
    pub fn require_function(&self, name: &str) -> Result<&AbiFunction, DeployError> {
        self.abi
            .functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                DeployError::artifact_format(
                    &self.paths.abi,
                    format!("ABI does not export function '{name}'"),
                )
            })
    }

    /// Look up a configurable and check that `len` bytes fit at its offset.
    pub fn configurable(&self, name: &str, len: usize) -> Result<&AbiConfigurable, DeployError> {
        let configurable = self
            .abi
            .configurables
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                DeployError::artifact_format(
                    &self.paths.abi,
                    format!("ABI does not declare configurable '{name}'"),
                )
            })?;

        let fits = byte_span(configurable.offset, len)
            .is_some_and(|span| span.end <= self.bytecode.len());
        if !fits {
            return Err(DeployError::artifact_format(
                &self.paths.bytecode,
                format!(
                    "configurable '{name}' at offset {} overruns bytecode of {} bytes",
                    configurable.offset,
                    self.bytecode.len()
                ),
            ));
        }

        Ok(configurable)
    }
}

/// Bytes `offset..offset + len`, or `None` when the range is not addressable.
pub(crate) fn byte_span(offset: u64, len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    Some(start..start.checked_add(len)?)
}

fn read_existing(path: &Path) -> Result<Vec<u8>, DeployError> {
    if !path.exists() {
        return Err(DeployError::ArtifactNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|e| DeployError::artifact_format(path, e))
}
