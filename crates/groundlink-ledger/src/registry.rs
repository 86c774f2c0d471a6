//! Node and satellite registration, stake custody and uptime reports.

use groundlink_protocol::{
    validation::{validate_coordinates, validate_metadata_cid, validate_tle_pair, validate_uptime},
    Address, Amount, LedgerError, LedgerEvent, LedgerResult, NodeId, SatelliteId,
};

use crate::{
    auth::{authorize, Role},
    events::Outbox,
    ledger::{Call, LedgerState},
    marketplace::{Node, NodeRegistration, Satellite, SatelliteRegistration},
};

impl LedgerState {
    pub(crate) fn register_node(
        &mut self,
        call: Call,
        req: NodeRegistration,
        out: &mut Outbox,
    ) -> LedgerResult<NodeId> {
        validate_coordinates(req.lat, req.lon)?;
        validate_uptime(req.uptime)?;
        if let Some(cid) = &req.metadata_cid {
            validate_metadata_cid(cid)?;
        }
        if req.stake < self.params.min_node_stake {
            return Err(LedgerError::InsufficientStake {
                provided: req.stake,
                required: self.params.min_node_stake,
            });
        }
        self.lock_stake(call.caller, req.stake)?;

        let owner = call.caller;
        let node_id = self.market.insert_node(|id| Node {
            id,
            owner,
            lat: req.lat,
            lon: req.lon,
            specs: req.specs,
            active: true,
            uptime: req.uptime,
            stake_amount: req.stake,
            total_relays: 0,
            metadata_cid: req.metadata_cid,
            registered_at: call.now,
        });
        out.emit(LedgerEvent::NodeRegistered {
            node_id,
            owner,
            lat: req.lat,
            lon: req.lon,
            stake: req.stake,
        });
        Ok(node_id)
    }

    pub(crate) fn register_satellite(
        &mut self,
        call: Call,
        req: SatelliteRegistration,
        out: &mut Outbox,
    ) -> LedgerResult<SatelliteId> {
        validate_tle_pair(&req.tle1, &req.tle2)?;
        if let Some(cid) = &req.metadata_cid {
            validate_metadata_cid(cid)?;
        }
        if req.stake < self.params.min_satellite_stake {
            return Err(LedgerError::InsufficientStake {
                provided: req.stake,
                required: self.params.min_satellite_stake,
            });
        }
        self.lock_stake(call.caller, req.stake)?;

        let owner = call.caller;
        let satellite_id = self.market.insert_satellite(|id| Satellite {
            id,
            owner,
            tle1: req.tle1,
            tle2: req.tle2,
            active: true,
            last_update: call.now,
            stake_amount: req.stake,
            metadata_cid: req.metadata_cid,
            registered_at: call.now,
        });
        out.emit(LedgerEvent::SatelliteRegistered { satellite_id, owner, stake: req.stake });
        Ok(satellite_id)
    }

    pub(crate) fn deactivate_node(&mut self, call: Call, node_id: NodeId, out: &mut Outbox) -> LedgerResult<()> {
        authorize(self, call.caller, Role::NodeOwner(node_id))?;
        let node = self.market.node_mut(node_id)?;
        if !node.active {
            return Err(LedgerError::NodeInactive(node_id));
        }
        node.active = false;
        out.emit(LedgerEvent::NodeDeactivated { node_id });
        Ok(())
    }

    /// Owner re-enables a node, topping its stake back up to the minimum.
    pub(crate) fn reactivate_node(
        &mut self,
        call: Call,
        node_id: NodeId,
        top_up: Amount,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        authorize(self, call.caller, Role::NodeOwner(node_id))?;
        let (active, stake) = {
            let node = self.market.node(node_id)?;
            (node.active, node.stake_amount)
        };
        if active {
            return Err(LedgerError::StillActive(format!("node {node_id}")));
        }
        let new_stake = stake.checked_add(top_up).ok_or(LedgerError::Overflow)?;
        if new_stake < self.params.min_node_stake {
            return Err(LedgerError::InsufficientStake {
                provided: new_stake,
                required: self.params.min_node_stake,
            });
        }
        self.lock_stake(call.caller, top_up)?;

        let node = self.market.node_mut(node_id)?;
        node.stake_amount = new_stake;
        node.active = true;
        out.emit(LedgerEvent::NodeReactivated { node_id, stake: new_stake });
        Ok(())
    }

    pub(crate) fn deactivate_satellite(
        &mut self,
        call: Call,
        satellite_id: SatelliteId,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        authorize(self, call.caller, Role::SatelliteOwner(satellite_id))?;
        let satellite = self.market.satellite_mut(satellite_id)?;
        if !satellite.active {
            return Err(LedgerError::SatelliteInactive(satellite_id));
        }
        satellite.active = false;
        out.emit(LedgerEvent::SatelliteDeactivated { satellite_id });
        Ok(())
    }

    pub(crate) fn update_satellite_tle(
        &mut self,
        call: Call,
        satellite_id: SatelliteId,
        tle1: String,
        tle2: String,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        authorize(self, call.caller, Role::SatelliteOwner(satellite_id))?;
        validate_tle_pair(&tle1, &tle2)?;
        let satellite = self.market.satellite_mut(satellite_id)?;
        satellite.tle1 = tle1;
        satellite.tle2 = tle2;
        satellite.last_update = call.now;
        out.emit(LedgerEvent::SatelliteTleUpdated { satellite_id });
        Ok(())
    }

    pub(crate) fn withdraw_node_stake(&mut self, call: Call, node_id: NodeId, out: &mut Outbox) -> LedgerResult<Amount> {
        authorize(self, call.caller, Role::NodeOwner(node_id))?;
        let node = self.market.node(node_id)?;
        if node.active {
            return Err(LedgerError::StillActive(format!("node {node_id}")));
        }
        if self.market.node_has_open_passes(node_id) {
            return Err(LedgerError::OpenPasses(format!("node {node_id}")));
        }
        let amount = node.stake_amount;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.release_stake(call.caller, amount)?;
        self.market.node_mut(node_id)?.stake_amount = 0;
        out.emit(LedgerEvent::NodeStakeWithdrawn { node_id, amount });
        Ok(amount)
    }

    pub(crate) fn withdraw_satellite_stake(
        &mut self,
        call: Call,
        satellite_id: SatelliteId,
        out: &mut Outbox,
    ) -> LedgerResult<Amount> {
        authorize(self, call.caller, Role::SatelliteOwner(satellite_id))?;
        let satellite = self.market.satellite(satellite_id)?;
        if satellite.active {
            return Err(LedgerError::StillActive(format!("satellite {satellite_id}")));
        }
        if self.market.satellite_has_open_passes(satellite_id) {
            return Err(LedgerError::OpenPasses(format!("satellite {satellite_id}")));
        }
        let amount = satellite.stake_amount;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.release_stake(call.caller, amount)?;
        self.market.satellite_mut(satellite_id)?.stake_amount = 0;
        out.emit(LedgerEvent::SatelliteStakeWithdrawn { satellite_id, amount });
        Ok(amount)
    }

    pub(crate) fn report_uptime(
        &mut self,
        call: Call,
        node_id: NodeId,
        uptime: u8,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        authorize(self, call.caller, Role::Attestor)?;
        validate_uptime(uptime)?;
        self.market.node_mut(node_id)?.uptime = uptime;
        out.emit(LedgerEvent::UptimeReported { node_id, uptime });
        Ok(())
    }

    fn lock_stake(&mut self, owner: Address, amount: Amount) -> LedgerResult<()> {
        let native = self.router.native_token()?.clone();
        self.router.move_funds(&native, owner, Address::STAKE_VAULT, amount)
    }

    fn release_stake(&mut self, owner: Address, amount: Amount) -> LedgerResult<()> {
        let native = self.router.native_token()?.clone();
        self.router.move_funds(&native, Address::STAKE_VAULT, owner, amount)
    }
}
