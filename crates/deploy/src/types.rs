//! Primitive identifiers shared across the pipeline.

use alloy_core::primitives::B256;
use derive_more::{Deref, Display, From};
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte account address.
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
    Deref,
    Display,
    From,
)]
#[serde(transparent)]
pub struct Address(B256);

impl Address {
    /// Derive the address owned by a secp256k1 public key.
    ///
    /// The address is the SHA-256 digest of the 64-byte uncompressed public key
    /// (the `0x04` SEC1 marker is dropped).
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let digest = Sha256::digest(&point.as_bytes()[1..]);
        Self(B256::from_slice(&digest))
    }

    /// Raw address bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl std::str::FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(Self)
            .map_err(|e| format!("invalid address '{s}': {e}"))
    }
}

/// A 32-byte deployed contract identifier.
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
    Deref,
    Display,
    From,
)]
#[serde(transparent)]
pub struct ContractId(B256);

impl ContractId {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.0
    }
}

impl From<[u8; 32]> for ContractId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl std::str::FromStr for ContractId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(Self)
            .map_err(|e| format!("invalid contract id '{s}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_and_display() {
        let hex = "0x09c0b2d1a486c439a87bcba6b46a7a1a23f3897cc83a94521a96da5c23bc58db";
        let address: Address = hex.parse().expect("valid address");
        assert_eq!(address.to_string(), hex);
    }

    #[test]
    fn test_address_rejects_short_input() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("".parse::<ContractId>().is_err());
    }

    #[test]
    fn test_address_serde_is_hex_string() {
        let address = Address::from([0xab; 32]);
        let json = serde_json::to_string(&address).expect("serialize");
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));

        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, address);
    }
}
