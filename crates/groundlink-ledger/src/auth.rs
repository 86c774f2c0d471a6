//! Role checks.
//!
//! Every privileged operation calls [`authorize`] before touching state.

use std::collections::BTreeSet;

use groundlink_protocol::{Address, LedgerError, LedgerEvent, LedgerResult, NodeId, PassId, SatelliteId};

use crate::{events::Outbox, ledger::LedgerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Governance,
    Validator,
    NodeOwner(NodeId),
    SatelliteOwner(SatelliteId),
    /// Either the booking operator or the node owner of the pass.
    PassCounterparty(PassId),
    PassNodeOperator(PassId),
    AuthorizedCaller,
    Attestor,
    PriceFeeder,
}

pub fn authorize(state: &LedgerState, caller: Address, role: Role) -> LedgerResult<()> {
    let allowed = match role {
        Role::Governance => Ok(state.roles.governance == caller),
        Role::Validator => Ok(state.oracle.is_active_validator(&caller)),
        Role::NodeOwner(id) => state.market.node(id).map(|n| n.owner == caller),
        Role::SatelliteOwner(id) => state.market.satellite(id).map(|s| s.owner == caller),
        Role::PassCounterparty(id) => state.market.pass(id).map(|p| p.is_counterparty(&caller)),
        Role::PassNodeOperator(id) => state.market.pass(id).map(|p| p.node_owner == caller),
        Role::AuthorizedCaller => Ok(state.credit.is_authorized(&caller)),
        Role::Attestor => Ok(state.roles.attestors.contains(&caller)),
        Role::PriceFeeder => Ok(state.roles.price_feeders.contains(&caller)),
    }?;

    if allowed {
        Ok(())
    } else {
        Err(denied(role))
    }
}

fn denied(role: Role) -> LedgerError {
    match role {
        Role::Governance => LedgerError::NotGovernance,
        Role::Validator => LedgerError::NotValidator,
        Role::NodeOwner(_) | Role::SatelliteOwner(_) | Role::PassNodeOperator(_) => {
            LedgerError::NotOwner
        }
        Role::PassCounterparty(id) => LedgerError::NotCounterparty(id),
        Role::AuthorizedCaller => LedgerError::NotAuthorizedCaller,
        Role::Attestor => LedgerError::NotAttestor,
        Role::PriceFeeder => LedgerError::NotPriceFeeder,
    }
}

// ============================================================================
// Governance-managed role sets
// ============================================================================

#[derive(Debug, Clone)]
pub struct Roles {
    pub governance:    Address,
    pub attestors:     BTreeSet<Address>,
    pub price_feeders: BTreeSet<Address>,
}

impl Roles {
    pub fn new(governance: Address) -> Self {
        Self {
            governance,
            attestors: BTreeSet::new(),
            price_feeders: BTreeSet::new(),
        }
    }

    pub fn set_attestor(&mut self, attestor: Address, enabled: bool, out: &mut Outbox) {
        if enabled {
            self.attestors.insert(attestor);
        } else {
            self.attestors.remove(&attestor);
        }
        out.emit(LedgerEvent::AttestorSet { attestor, enabled });
    }

    pub fn set_price_feeder(&mut self, feeder: Address, enabled: bool, out: &mut Outbox) {
        if enabled {
            self.price_feeders.insert(feeder);
        } else {
            self.price_feeders.remove(&feeder);
        }
        out.emit(LedgerEvent::PriceFeederSet { feeder, enabled });
    }

    pub fn transfer_governance(&mut self, to: Address, out: &mut Outbox) -> LedgerResult<()> {
        if to.is_system() {
            return Err(LedgerError::InvalidParameter(format!(
                "{to} cannot hold governance"
            )));
        }
        let from = std::mem::replace(&mut self.governance, to);
        out.emit(LedgerEvent::GovernanceTransferred { from, to });
        Ok(())
    }
}
