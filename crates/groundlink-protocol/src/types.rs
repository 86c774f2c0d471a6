//! Identifiers and value types shared by every GroundLink crate.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::keccak256;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Smallest indivisible unit of an asset.
pub type Amount = u128;

pub type NodeId = u64;
pub type SatelliteId = u64;
pub type PassId = u64;

// ============================================================================
// Address
// ============================================================================

/// 32-byte account identifier. Rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    /// Holds booking payments until settlement or refund.
    pub const ESCROW: Address = Address::system(1);
    /// Holds node and satellite registration stake.
    pub const STAKE_VAULT: Address = Address::system(2);
    /// Funds fixed relay rewards.
    pub const REWARD_POOL: Address = Address::system(3);
    /// Receives protocol fees and slashed stake.
    pub const TREASURY: Address = Address::system(4);
    /// Liquidity the router converts against.
    pub const ROUTER_RESERVE: Address = Address::system(5);
    /// The marketplace acting on its own behalf (e.g. recording credit).
    pub const MARKETPLACE: Address = Address::system(6);

    const fn system(tag: u8) -> Self {
        let mut bytes = [0u8; 32];
        bytes[31] = tag;
        Address(bytes)
    }

    /// Deterministic address derived from a human label (keccak256 of the label).
    pub fn from_label(label: &str) -> Self {
        Address(keccak256(label.as_bytes()))
    }

    /// True for the reserved protocol accounts.
    pub fn is_system(&self) -> bool {
        self.0[..31].iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &hex::encode(&self.0[..6]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct ParseAddressError(String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ParseAddressError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseAddressError("expected 32 bytes".to_string()))?;
        Ok(Address(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TokenId
// ============================================================================

/// Asset symbol, normalized to upper case (e.g. `GLNK`, `USDC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(symbol: &str) -> Self {
        TokenId(symbol.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        TokenId::new(s)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TokenId::new(&s))
    }
}

// ============================================================================
// Pass state
// ============================================================================

/// Lifecycle of a booked relay session.
///
/// ```text
/// Booked → Confirmed → Locked → Completed → Verified → Settled
///    ↘         ↘                    ↘
///     Cancelled  Cancelled            Cancelled (dispute window elapsed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Booked,
    Confirmed,
    Locked,
    Completed,
    Verified,
    Settled,
    Cancelled,
}

impl PassState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PassState::Settled | PassState::Cancelled)
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassState::Booked => "booked",
            PassState::Confirmed => "confirmed",
            PassState::Locked => "locked",
            PassState::Completed => "completed",
            PassState::Verified => "verified",
            PassState::Settled => "settled",
            PassState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a pass ended in `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelReason {
    /// A counterparty withdrew before the lock boundary.
    Counterparty { by: Address },
    /// The dispute window elapsed with an open dispute.
    VerificationFailed,
    /// The dispute window elapsed without any attestation arriving.
    AttestationTimeout,
    /// The dispute window elapsed while the satellite had no fresh consensus
    /// TLE to verify against. The node is not at fault.
    TleUnavailable,
}

/// Why a completed pass could not be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    AttestationRejected,
    OutsidePassWindow,
    StaleTle,
}

impl fmt::Display for DisputeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisputeReason::AttestationRejected => "attestation rejected",
            DisputeReason::OutsidePassWindow => "relay outside pass window",
            DisputeReason::StaleTle => "satellite TLE is stale",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Attestation boundary
// ============================================================================

/// Relay evidence handed to the off-chain attestation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub pass_id:             PassId,
    #[serde(with = "hex_bytes32")]
    pub proof_hash:          [u8; 32],
    pub relay_timestamp:     Timestamp,
    pub node_id:             NodeId,
    pub satellite_id:        SatelliteId,
    pub expected_start_time: Timestamp,
    pub duration_minutes:    u32,
}

/// Serde helper: `[u8; 32]` as a 64-char hex string.
pub mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
