use serde::{Deserialize, Serialize};

use crate::types::{
    hex_bytes32, Address, Amount, CancelReason, DisputeReason, NodeId, PassId, SatelliteId,
    Timestamp, TokenId,
};

// ============================================================================
// Domain events
// ============================================================================

/// Everything a committed ledger operation announces to observers.
///
/// Events carry enough to rebuild an indexer's view without reading ledger
/// state. They are appended only when the operation that produced them commits.
///
/// Externally tagged (`{"pass_booked": {...}}`) so 128-bit amounts decode
/// without buffering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    // --- Oracle ---------------------------------------------------------------
    ValidatorAdded { validator: Address },
    ValidatorRemoved { validator: Address },
    MinValidatorsUpdated { old: u32, new: u32 },
    MinConfidenceUpdated { old: u8, new: u8 },
    TleSubmitted {
        satellite_id: SatelliteId,
        validator:    Address,
        observed_at:  Timestamp,
        confidence:   u8,
    },
    ConsensusReached {
        satellite_id:    SatelliteId,
        confidence:      u8,
        validator_count: u32,
    },
    /// A published result failed its freshness check and was marked invalid.
    ConsensusExpired {
        satellite_id: SatelliteId,
        last_update:  Timestamp,
    },

    // --- Router ---------------------------------------------------------------
    TokenRegistered {
        token:     TokenId,
        decimals:  u8,
        is_native: bool,
    },
    TokenSupportChanged { token: TokenId, supported: bool },
    PriceUpdated {
        token:      TokenId,
        price:      Amount,
        confidence: u8,
        emergency:  bool,
    },
    PaymentRouted {
        from_token: TokenId,
        to_token:   TokenId,
        from:       Address,
        to:         Address,
        amount_in:  Amount,
        amount_out: Amount,
    },
    Deposited {
        token:  TokenId,
        to:     Address,
        amount: Amount,
    },
    Transferred {
        token:  TokenId,
        from:   Address,
        to:     Address,
        amount: Amount,
    },

    // --- Registry -------------------------------------------------------------
    NodeRegistered {
        node_id: NodeId,
        owner:   Address,
        lat:     i32,
        lon:     i32,
        stake:   Amount,
    },
    NodeDeactivated { node_id: NodeId },
    NodeReactivated { node_id: NodeId, stake: Amount },
    UptimeReported { node_id: NodeId, uptime: u8 },
    NodeStakeWithdrawn { node_id: NodeId, amount: Amount },
    SatelliteRegistered {
        satellite_id: SatelliteId,
        owner:        Address,
        stake:        Amount,
    },
    SatelliteTleUpdated { satellite_id: SatelliteId },
    SatelliteDeactivated { satellite_id: SatelliteId },
    SatelliteStakeWithdrawn { satellite_id: SatelliteId, amount: Amount },
    StakeSlashed {
        node_id:               NodeId,
        pass_id:               PassId,
        amount:                Amount,
        to_satellite_operator: Amount,
        to_treasury:           Amount,
    },

    // --- Pass lifecycle -------------------------------------------------------
    PassBooked {
        pass_id:          PassId,
        node_id:          NodeId,
        satellite_id:     SatelliteId,
        operator:         Address,
        start_time:       Timestamp,
        duration_minutes: u32,
        token:            TokenId,
        amount:           Amount,
    },
    PassConfirmed { pass_id: PassId },
    PassLocked { pass_id: PassId },
    PassCompleted {
        pass_id:    PassId,
        #[serde(with = "hex_bytes32")]
        proof_hash: [u8; 32],
    },
    PassDisputed { pass_id: PassId, reason: DisputeReason },
    PassVerified { pass_id: PassId },
    PassCancelled {
        pass_id: PassId,
        reason:  CancelReason,
        refund:  Amount,
    },

    // --- Settlement & credit --------------------------------------------------
    RewardClaimed {
        pass_id:       PassId,
        node_operator: Address,
        payout_token:  TokenId,
        payout:        Amount,
        fee:           Amount,
        reward:        Amount,
    },
    CreditBoosted {
        user:   Address,
        points: u16,
        score:  u16,
    },

    // --- Governance -----------------------------------------------------------
    AuthorizedCallerSet { caller: Address, authorized: bool },
    AttestorSet { attestor: Address, enabled: bool },
    PriceFeederSet { feeder: Address, enabled: bool },
    GovernanceTransferred { from: Address, to: Address },
}

/// One committed event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly increasing, starting at 1.
    pub seq:   u64,
    /// Ledger clock at commit.
    pub at:    Timestamp,
    pub event: LedgerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_variant() {
        let ev = LedgerEvent::PassCancelled {
            pass_id: 3,
            reason:  CancelReason::AttestationTimeout,
            refund:  500,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["pass_cancelled"]["pass_id"], 3);
        assert_eq!(json["pass_cancelled"]["reason"]["reason"], "attestation_timeout");

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn proof_hash_renders_as_hex() {
        let ev = LedgerEvent::PassCompleted { pass_id: 1, proof_hash: [0xab; 32] };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["pass_completed"]["proof_hash"], "ab".repeat(32));
    }
}
