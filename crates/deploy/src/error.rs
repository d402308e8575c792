//! Error taxonomy for the bootstrap pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can halt the bootstrap pipeline.
///
/// Each variant maps to a distinct process exit code so operators can tell
/// configuration, network and authorization failures apart without reading logs.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A role secret is missing or cannot be parsed as a recovery phrase.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A compiled artifact file does not exist.
    #[error("artifact not found: {}", path.display())]
    ArtifactNotFound {
        /// The missing file.
        path: PathBuf,
    },

    /// A compiled artifact exists but is not usable.
    #[error("malformed artifact {}: {reason}", path.display())]
    ArtifactFormat {
        /// The offending file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The network rejected the deployment transaction.
    #[error("deployment rejected: {0}")]
    Deployment(String),

    /// The contract rejected the signer.
    #[error("authorization rejected: {0}")]
    Authorization(String),

    /// The transaction was submitted but finality was not observed in time.
    #[error("timed out waiting for finality of {0}")]
    FinalityTimeout(String),

    /// Transport-level failure talking to the node.
    #[error("network error: {0}")]
    Network(String),

    /// The contract reverted for a reason other than authorization.
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// The checkpoint file is unreadable, locked or belongs to another deployment.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

impl DeployError {
    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::ArtifactNotFound { .. } => 3,
            Self::ArtifactFormat { .. } => 4,
            Self::Deployment(_) => 5,
            Self::Authorization(_) => 6,
            Self::FinalityTimeout(_) => 7,
            Self::Network(_) => 8,
            Self::Checkpoint(_) => 9,
            Self::Reverted(_) => 10,
        }
    }

    pub(crate) fn artifact_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
