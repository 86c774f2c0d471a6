//! Node, satellite and pass records.
//!
//! The `Marketplace` store only owns the records and answers structural
//! questions about them (lookup, overlap, open passes). Operations that also
//! move funds or consult the oracle live in `registry` and `lifecycle`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use groundlink_protocol::{
    types::hex_bytes32, Address, Amount, AttestationRequest, CancelReason, DisputeReason,
    LedgerError, LedgerResult, NodeId, PassId, PassState, SatelliteId, Timestamp, TokenId,
};

use crate::config::ProtocolParams;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id:            NodeId,
    pub owner:         Address,
    /// Latitude ×10 000.
    pub lat:           i32,
    /// Longitude ×10 000.
    pub lon:           i32,
    pub specs:         String,
    pub active:        bool,
    pub uptime:        u8,
    pub stake_amount:  Amount,
    pub total_relays:  u64,
    pub metadata_cid:  Option<String>,
    pub registered_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Satellite {
    pub id:            SatelliteId,
    pub owner:         Address,
    pub tle1:          String,
    pub tle2:          String,
    pub active:        bool,
    pub last_update:   Timestamp,
    pub stake_amount:  Amount,
    pub metadata_cid:  Option<String>,
    pub registered_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTelemetry {
    pub relay_timestamp: Timestamp,
    pub bytes_relayed:   u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispute {
    pub reason:    DisputeReason,
    pub opened_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pass {
    pub id:                PassId,
    /// Satellite owner who booked and paid.
    pub operator:          Address,
    pub node_id:           NodeId,
    pub satellite_id:      SatelliteId,
    pub node_owner:        Address,
    pub start_time:        Timestamp,
    pub duration_minutes:  u32,
    pub payment_token:     TokenId,
    pub payment_amount:    Amount,
    /// Settlement-asset output quoted at booking, after the protocol fee.
    pub quoted_settlement: Amount,
    #[serde(with = "hex_bytes32")]
    pub proof_hash:        [u8; 32],
    pub state:             PassState,
    pub created_at:        Timestamp,
    pub confirm_deadline:  Timestamp,
    pub confirmed_at:      Option<Timestamp>,
    pub locked_at:         Option<Timestamp>,
    pub telemetry:         Option<RelayTelemetry>,
    pub completed_at:      Option<Timestamp>,
    pub attestation:       Option<bool>,
    pub dispute:           Option<Dispute>,
    pub verified_at:       Option<Timestamp>,
    pub settled_at:        Option<Timestamp>,
    pub cancel_reason:     Option<CancelReason>,
}

impl Pass {
    pub fn end_time(&self) -> Timestamp {
        self.start_time.saturating_add(u64::from(self.duration_minutes) * 60)
    }

    /// `start_time − lock_window`: after this, a confirmed pass is locked.
    pub fn lock_boundary(&self, lock_window: u64) -> Timestamp {
        self.start_time.saturating_sub(lock_window)
    }

    /// Last second at which an attestation is accepted.
    pub fn dispute_deadline(&self, dispute_window: u64) -> Option<Timestamp> {
        self.completed_at.map(|at| at.saturating_add(dispute_window))
    }

    pub fn is_counterparty(&self, addr: &Address) -> bool {
        self.operator == *addr || self.node_owner == *addr
    }

    /// State after any time-gated transition that is due at `now`.
    /// Pure: nothing is committed.
    pub fn effective_state(&self, now: Timestamp, params: &ProtocolParams) -> PassState {
        match self.state {
            PassState::Confirmed if now >= self.lock_boundary(params.lock_window_secs) => {
                PassState::Locked
            }
            PassState::Completed
                if self
                    .dispute_deadline(params.dispute_window_secs)
                    .is_some_and(|deadline| now > deadline) =>
            {
                PassState::Cancelled
            }
            state => state,
        }
    }

    /// Evidence for the attestation collaborator; `None` before completion.
    pub fn attestation_request(&self) -> Option<AttestationRequest> {
        let telemetry = self.telemetry?;
        Some(AttestationRequest {
            pass_id:             self.id,
            proof_hash:          self.proof_hash,
            relay_timestamp:     telemetry.relay_timestamp,
            node_id:             self.node_id,
            satellite_id:        self.satellite_id,
            expected_start_time: self.start_time,
            duration_minutes:    self.duration_minutes,
        })
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub lat:          i32,
    pub lon:          i32,
    pub specs:        String,
    pub uptime:       u8,
    pub stake:        Amount,
    #[serde(default)]
    pub metadata_cid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteRegistration {
    pub tle1:         String,
    pub tle2:         String,
    pub stake:        Amount,
    #[serde(default)]
    pub metadata_cid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub node_id:          NodeId,
    pub satellite_id:     SatelliteId,
    pub start_time:       Timestamp,
    pub duration_minutes: u32,
    pub token:            TokenId,
    pub amount:           Amount,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct Marketplace {
    nodes:             BTreeMap<NodeId, Node>,
    satellites:        BTreeMap<SatelliteId, Satellite>,
    passes:            BTreeMap<PassId, Pass>,
    next_node_id:      NodeId,
    next_satellite_id: SatelliteId,
    next_pass_id:      PassId,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl Marketplace {
    pub fn new() -> Self {
        Self {
            nodes:             BTreeMap::new(),
            satellites:        BTreeMap::new(),
            passes:            BTreeMap::new(),
            next_node_id:      1,
            next_satellite_id: 1,
            next_pass_id:      1,
        }
    }

    pub fn node(&self, id: NodeId) -> LedgerResult<&Node> {
        self.nodes.get(&id).ok_or(LedgerError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> LedgerResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(LedgerError::NodeNotFound(id))
    }

    pub fn satellite(&self, id: SatelliteId) -> LedgerResult<&Satellite> {
        self.satellites.get(&id).ok_or(LedgerError::SatelliteNotFound(id))
    }

    pub fn satellite_mut(&mut self, id: SatelliteId) -> LedgerResult<&mut Satellite> {
        self.satellites.get_mut(&id).ok_or(LedgerError::SatelliteNotFound(id))
    }

    pub fn pass(&self, id: PassId) -> LedgerResult<&Pass> {
        self.passes.get(&id).ok_or(LedgerError::PassNotFound(id))
    }

    pub fn pass_mut(&mut self, id: PassId) -> LedgerResult<&mut Pass> {
        self.passes.get_mut(&id).ok_or(LedgerError::PassNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn satellites(&self) -> impl Iterator<Item = &Satellite> {
        self.satellites.values()
    }

    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.passes.values()
    }

    pub(crate) fn insert_node(&mut self, build: impl FnOnce(NodeId) -> Node) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        self.nodes.insert(id, build(id));
        id
    }

    pub(crate) fn insert_satellite(&mut self, build: impl FnOnce(SatelliteId) -> Satellite) -> SatelliteId {
        let id = self.next_satellite_id;
        self.next_satellite_id += 1;
        self.satellites.insert(id, build(id));
        id
    }

    pub(crate) fn insert_pass(&mut self, build: impl FnOnce(PassId) -> Pass) -> PassId {
        let id = self.next_pass_id;
        self.next_pass_id += 1;
        self.passes.insert(id, build(id));
        id
    }

    /// A non-terminal pass on `node_id` overlapping `[start, end)`.
    pub fn conflicting_pass(&self, node_id: NodeId, start: Timestamp, end: Timestamp) -> Option<PassId> {
        self.passes
            .values()
            .filter(|p| p.node_id == node_id && !p.state.is_terminal())
            .find(|p| p.start_time < end && start < p.end_time())
            .map(|p| p.id)
    }

    pub fn node_has_open_passes(&self, node_id: NodeId) -> bool {
        self.passes
            .values()
            .any(|p| p.node_id == node_id && !p.state.is_terminal())
    }

    pub fn satellite_has_open_passes(&self, satellite_id: SatelliteId) -> bool {
        self.passes
            .values()
            .any(|p| p.satellite_id == satellite_id && !p.state.is_terminal())
    }
}
