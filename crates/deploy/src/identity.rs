//! Role-scoped signing identities derived from recovery phrases.

use std::fmt;

use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use k256::ecdsa::SigningKey;

use crate::{DeployError, types::Address};

/// BIP-32 derivation path used by Fuel wallets for the first account.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/1179993420'/0'/0/0";

/// The three actors of the bootstrap pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// Pays for and signs the deployment transaction.
    Deployer,
    /// Bound into the contract as `PROTOCOL_OWNER`; grants admin rights.
    Owner,
    /// Sets the runtime protocol configuration.
    Admin,
}

impl Role {
    /// Environment variable holding this role's recovery phrase.
    pub fn env_var(&self) -> &'static str {
        match self {
            Role::Deployer => "PROTOCOL_DEPLOYER",
            Role::Owner => "PROTOCOL_OWNER",
            Role::Admin => "PROTOCOL_ADMIN",
        }
    }
}

/// A recovery phrase. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryPhrase(String);

impl RecoveryPhrase {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whitespace-normalized form, used to detect the same phrase backing two roles.
    fn normalized(&self) -> String {
        self.0.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryPhrase(<redacted>)")
    }
}

impl From<&str> for RecoveryPhrase {
    fn from(phrase: &str) -> Self {
        Self::new(phrase)
    }
}

/// Recovery phrases for each role, supplied explicitly by the operator.
#[derive(Debug, Clone, Default)]
pub struct RoleSecrets {
    pub deployer: Option<RecoveryPhrase>,
    pub owner: Option<RecoveryPhrase>,
    pub admin: Option<RecoveryPhrase>,
}

impl RoleSecrets {
    /// Read `PROTOCOL_DEPLOYER`, `PROTOCOL_OWNER` and `PROTOCOL_ADMIN`.
    ///
    /// Absent variables are left as `None`; the resolver reports them when the
    /// role is actually needed.
    pub fn from_env() -> Self {
        let read = |role: Role| std::env::var(role.env_var()).ok().map(RecoveryPhrase::new);
        Self {
            deployer: read(Role::Deployer),
            owner: read(Role::Owner),
            admin: read(Role::Admin),
        }
    }

    /// Set the phrase for a role.
    pub fn with(mut self, role: Role, phrase: impl Into<RecoveryPhrase>) -> Self {
        *self.slot_mut(role) = Some(phrase.into());
        self
    }

    /// Remove the phrase for a role.
    pub fn without(mut self, role: Role) -> Self {
        *self.slot_mut(role) = None;
        self
    }

    pub fn get(&self, role: Role) -> Option<&RecoveryPhrase> {
        match role {
            Role::Deployer => self.deployer.as_ref(),
            Role::Owner => self.owner.as_ref(),
            Role::Admin => self.admin.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<RecoveryPhrase> {
        match role {
            Role::Deployer => &mut self.deployer,
            Role::Owner => &mut self.owner,
            Role::Admin => &mut self.admin,
        }
    }

    /// Roles other than `role` configured with the same phrase.
    fn sharing_with(&self, role: Role) -> Vec<Role> {
        let Some(phrase) = self.get(role).map(RecoveryPhrase::normalized) else {
            return Vec::new();
        };
        <Role as strum::IntoEnumIterator>::iter()
            .filter(|other| *other != role)
            .filter(|other| {
                self.get(*other).map(RecoveryPhrase::normalized) == Some(phrase.clone())
            })
            .collect()
    }
}

impl From<String> for RecoveryPhrase {
    fn from(phrase: String) -> Self {
        Self(phrase)
    }
}

/// An address plus the key able to authorize transactions for it.
#[derive(Clone)]
pub struct SigningIdentity {
    role: Role,
    address: Address,
    key: SigningKey,
}

impl SigningIdentity {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Raw 32-byte secret key, handed to network clients that sign themselves.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.key.to_bytes());
        bytes
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("role", &self.role)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derives signing identities from [`RoleSecrets`].
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    secrets: RoleSecrets,
    derivation_path: String,
    strict_roles: bool,
}

impl IdentityResolver {
    pub fn new(secrets: RoleSecrets) -> Self {
        Self {
            secrets,
            derivation_path: DEFAULT_DERIVATION_PATH.to_string(),
            strict_roles: false,
        }
    }

    /// Override the BIP-32 derivation path.
    pub fn derivation_path(mut self, path: impl Into<String>) -> Self {
        self.derivation_path = path.into();
        self
    }

    /// Reject a phrase that backs more than one role instead of only warning.
    pub fn strict_roles(mut self, strict: bool) -> Self {
        self.strict_roles = strict;
        self
    }

    /// Derive the identity for `role`.
    pub fn resolve(&self, role: Role) -> Result<SigningIdentity, DeployError> {
        let phrase = self
            .secrets
            .get(role)
            .filter(|p| !p.expose().trim().is_empty())
            .ok_or_else(|| {
                DeployError::Configuration(format!(
                    "missing recovery phrase for {role} (set {})",
                    role.env_var()
                ))
            })?;

        let shared = self.secrets.sharing_with(role);
        if !shared.is_empty() {
            if self.strict_roles {
                return Err(DeployError::Configuration(format!(
                    "recovery phrase for {role} also backs {shared:?}"
                )));
            }
            tracing::warn!(
                role = %role,
                shared_with = ?shared,
                "Same recovery phrase backs several roles"
            );
        }

        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase.normalized())
            .derivation_path(&self.derivation_path)
            .map_err(|e| {
                DeployError::Configuration(format!(
                    "invalid derivation path {}: {e}",
                    self.derivation_path
                ))
            })?
            .build()
            .map_err(|e| {
                DeployError::Configuration(format!(
                    "{} is not a valid recovery phrase: {e}",
                    role.env_var()
                ))
            })?;

        let key = signer.credential().clone();
        let address = Address::from_public_key(key.verifying_key());

        tracing::debug!(role = %role, address = %address, "Resolved signing identity");

        Ok(SigningIdentity { role, address, key })
    }
}
