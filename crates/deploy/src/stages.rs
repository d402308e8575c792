//! Pipeline stage markers for the type-state pattern.
//!
//! The bootstrap order is fixed: ArtifactLoaded -> Deployed -> AdminGranted -> ConfigUpdated.
//! Each marker carries what later stages need, so a stage cannot be reached
//! without the output of the one before it.

use serde::{Deserialize, Serialize};

use crate::{network::TxReceipt, types::ContractId};

/// Runtime view of how far the pipeline got.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PipelineState {
    Uninitialized,
    ArtifactLoaded,
    Deployed,
    AdminGranted,
    ConfigUpdated,
}

/// Output of the deployment stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub contract_id: ContractId,
    /// Absent when resuming against a contract deployed by an earlier run.
    pub receipt: Option<TxReceipt>,
}

/// Artifact loaded, nothing on-chain yet.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoaded;

/// Contract deployed.
#[derive(Debug, Clone)]
pub struct Deployed {
    pub deployment: DeploymentResult,
}

/// Admin registered by the owner.
#[derive(Debug, Clone)]
pub struct AdminGranted {
    pub deployment: DeploymentResult,
    pub admin_grant: Option<TxReceipt>,
}

/// Runtime configuration set by the admin. Terminal.
#[derive(Debug, Clone)]
pub struct ConfigUpdated {
    pub deployment: DeploymentResult,
    pub admin_grant: Option<TxReceipt>,
    pub config_update: TxReceipt,
}

/// Sealed trait for pipeline stages.
mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ArtifactLoaded {}
    impl Sealed for super::Deployed {}
    impl Sealed for super::AdminGranted {}
    impl Sealed for super::ConfigUpdated {}
}

/// Marker trait for valid pipeline stages.
pub trait PipelineStage: sealed::Sealed + Send + Sync + 'static {
    /// The runtime state this stage corresponds to.
    const STATE: PipelineState;
}

impl PipelineStage for ArtifactLoaded {
    const STATE: PipelineState = PipelineState::ArtifactLoaded;
}
impl PipelineStage for Deployed {
    const STATE: PipelineState = PipelineState::Deployed;
}
impl PipelineStage for AdminGranted {
    const STATE: PipelineState = PipelineState::AdminGranted;
}
impl PipelineStage for ConfigUpdated {
    const STATE: PipelineState = PipelineState::ConfigUpdated;
}

/// Trait encoding valid stage transitions.
///
/// Implemented only for:
/// - ArtifactLoaded -> Deployed
/// - Deployed -> AdminGranted
/// - AdminGranted -> ConfigUpdated
pub trait NextStage: PipelineStage {
    type Next: PipelineStage;
}

impl NextStage for ArtifactLoaded {
    type Next = Deployed;
}

impl NextStage for Deployed {
    type Next = AdminGranted;
}

impl NextStage for AdminGranted {
    type Next = ConfigUpdated;
}

// ConfigUpdated has no NextStage impl - it's terminal

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(PipelineState::Uninitialized < PipelineState::ArtifactLoaded);
        assert!(PipelineState::ArtifactLoaded < PipelineState::Deployed);
        assert!(PipelineState::Deployed < PipelineState::AdminGranted);
        assert!(PipelineState::AdminGranted < PipelineState::ConfigUpdated);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::AdminGranted.to_string(), "admin-granted");
        assert_eq!(
            "deployed".parse::<PipelineState>().unwrap(),
            PipelineState::Deployed
        );
        assert_eq!(
            serde_json::to_string(&PipelineState::ConfigUpdated).unwrap(),
            "\"config-updated\""
        );
    }

    #[test]
    fn test_stage_markers_match_states() {
        fn next_state<S: NextStage>() -> PipelineState {
            <S::Next as PipelineStage>::STATE
        }

        assert_eq!(<ArtifactLoaded as PipelineStage>::STATE, PipelineState::ArtifactLoaded);
        assert_eq!(next_state::<ArtifactLoaded>(), PipelineState::Deployed);
        assert_eq!(next_state::<Deployed>(), PipelineState::AdminGranted);
        assert_eq!(next_state::<AdminGranted>(), PipelineState::ConfigUpdated);
    }
}
