//! The transactional facade over every component.
//!
//! Each mutating operation runs against a draft copy of [`LedgerState`]. On
//! success the draft replaces the live state and the staged events are
//! appended to the log in one step; on error both are dropped, so a rejected
//! operation leaves no trace.

use tracing::{debug, info};

use groundlink_protocol::{
    Address, Amount, AttestationRequest, EventRecord, LedgerError, LedgerResult, NodeId, PassId, PassState,
    SatelliteId, Timestamp, TokenId,
};

use crate::{
    auth::{authorize, Role, Roles},
    config::{Genesis, ProtocolParams},
    credit::{BnplEligibility, CreditRegistry},
    events::{EventLog, Outbox},
    marketplace::{
        BookingRequest, Marketplace, Node, NodeRegistration, Pass, RelayTelemetry, Satellite,
        SatelliteRegistration,
    },
    oracle::{ConsensusResult, OracleAggregator, TleObservation, Validator},
    router::{NewToken, PaymentReceipt, PaymentRouter, SwapQuote, TokenInfo},
    settlement::RewardReceipt,
};

/// All ledger data. Cloned to form the draft of each operation.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub params: ProtocolParams,
    pub roles:  Roles,
    pub oracle: OracleAggregator,
    pub router: PaymentRouter,
    pub market: Marketplace,
    pub credit: CreditRegistry,
}

/// Who is calling and the authoritative clock for this operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub caller: Address,
    pub now:    Timestamp,
}

impl Call {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

pub struct Ledger {
    state: LedgerState,
    log:   EventLog,
}

impl Ledger {
    pub fn from_genesis(genesis: Genesis) -> LedgerResult<Self> {
        genesis.params.validate()?;
        let now = genesis.timestamp;
        let mut state = LedgerState {
            oracle: OracleAggregator::new(genesis.params.min_validators, genesis.params.min_confidence),
            params: genesis.params,
            roles:  Roles::new(genesis.governance),
            router: PaymentRouter::new(),
            market: Marketplace::new(),
            credit: CreditRegistry::new(),
        };

        let mut out = Outbox::default();
        for spec in genesis.tokens {
            let token = spec.token.clone();
            state.router.register_token(
                NewToken {
                    token:          spec.token,
                    decimals:       spec.decimals,
                    is_native:      spec.is_native,
                    price_feed_ref: spec.price_feed_ref,
                    min_confidence: spec.min_confidence,
                },
                &mut out,
            )?;
            // Governance-set bootstrap price, flagged like any override.
            if spec.price > 0 {
                state.router.emergency_set_price(&token, spec.price, now, &mut out)?;
            }
        }
        for balance in genesis.balances {
            state.router.deposit(&balance.token, balance.address, balance.amount, &mut out)?;
        }
        for validator in genesis.validators {
            state.oracle.add_validator(validator, now, &mut out)?;
        }
        for attestor in genesis.attestors {
            state.roles.set_attestor(attestor, true, &mut out);
        }
        for feeder in genesis.price_feeders {
            state.roles.set_price_feeder(feeder, true, &mut out);
        }

        let mut log = EventLog::new();
        let events = out.len();
        log.commit(now, out);
        info!(governance = %state.roles.governance, events, "ledger initialised from genesis");
        Ok(Self { state, log })
    }

    fn transact<T>(
        &mut self,
        call: Call,
        op: &'static str,
        f: impl FnOnce(&mut LedgerState, &mut Outbox) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        // Protocol accounts only move through component internals.
        if call.caller.is_system() {
            debug!(op, caller = %call.caller, "rejected reserved caller");
            return Err(LedgerError::ReservedCaller(call.caller));
        }
        let mut draft = self.state.clone();
        let mut out = Outbox::default();
        match f(&mut draft, &mut out) {
            Ok(value) => {
                debug!(op, caller = %call.caller, events = out.len(), "committed");
                self.state = draft;
                self.log.commit(call.now, out);
                Ok(value)
            }
            Err(e) => {
                debug!(op, caller = %call.caller, error = %e, "rejected");
                Err(e)
            }
        }
    }

    fn governed<T>(
        &mut self,
        call: Call,
        op: &'static str,
        f: impl FnOnce(&mut LedgerState, &mut Outbox) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.transact(call, op, |st, out| {
            authorize(st, call.caller, Role::Governance)?;
            f(st, out)
        })
    }

    // ========================================================================
    // Governance
    // ========================================================================

    pub fn add_validator(&mut self, call: Call, validator: Address) -> LedgerResult<()> {
        self.governed(call, "add_validator", |st, out| st.oracle.add_validator(validator, call.now, out))?;
        info!(%validator, "validator added");
        Ok(())
    }

    pub fn remove_validator(&mut self, call: Call, validator: Address) -> LedgerResult<()> {
        self.governed(call, "remove_validator", |st, out| st.oracle.remove_validator(validator, out))?;
        info!(%validator, "validator removed");
        Ok(())
    }

    pub fn update_min_validators(&mut self, call: Call, value: u32) -> LedgerResult<()> {
        self.governed(call, "update_min_validators", |st, out| st.oracle.set_min_validators(value, out))
    }

    pub fn update_min_confidence(&mut self, call: Call, value: u8) -> LedgerResult<()> {
        self.governed(call, "update_min_confidence", |st, out| st.oracle.set_min_confidence(value, out))
    }

    pub fn set_attestor(&mut self, call: Call, attestor: Address, enabled: bool) -> LedgerResult<()> {
        self.governed(call, "set_attestor", |st, out| {
            st.roles.set_attestor(attestor, enabled, out);
            Ok(())
        })
    }

    pub fn set_price_feeder(&mut self, call: Call, feeder: Address, enabled: bool) -> LedgerResult<()> {
        self.governed(call, "set_price_feeder", |st, out| {
            st.roles.set_price_feeder(feeder, enabled, out);
            Ok(())
        })
    }

    pub fn set_authorized_caller(&mut self, call: Call, caller: Address, authorized: bool) -> LedgerResult<()> {
        self.governed(call, "set_authorized_caller", |st, out| {
            st.credit.set_authorized_caller(caller, authorized, out)
        })
    }

    pub fn transfer_governance(&mut self, call: Call, to: Address) -> LedgerResult<()> {
        self.governed(call, "transfer_governance", |st, out| st.roles.transfer_governance(to, out))?;
        info!(from = %call.caller, %to, "governance transferred");
        Ok(())
    }

    pub fn register_token(&mut self, call: Call, token: NewToken) -> LedgerResult<()> {
        let symbol = token.token.clone();
        self.governed(call, "register_token", |st, out| st.router.register_token(token, out))?;
        info!(token = %symbol, "token registered");
        Ok(())
    }

    pub fn set_token_supported(&mut self, call: Call, token: &TokenId, supported: bool) -> LedgerResult<()> {
        self.governed(call, "set_token_supported", |st, out| st.router.set_supported(token, supported, out))
    }

    pub fn emergency_set_price(&mut self, call: Call, token: &TokenId, price: Amount) -> LedgerResult<()> {
        self.governed(call, "emergency_set_price", |st, out| {
            st.router.emergency_set_price(token, price, call.now, out)
        })?;
        info!(%token, price, "emergency price override");
        Ok(())
    }

    /// Credit bridged funds to `to`.
    pub fn deposit(&mut self, call: Call, token: &TokenId, to: Address, amount: Amount) -> LedgerResult<()> {
        self.governed(call, "deposit", |st, out| st.router.deposit(token, to, amount, out))
    }

    // ========================================================================
    // Oracle
    // ========================================================================

    pub fn submit_tle(
        &mut self,
        call: Call,
        satellite_id: SatelliteId,
        line1: &str,
        line2: &str,
        observed_at: Timestamp,
        confidence: u8,
    ) -> LedgerResult<Option<ConsensusResult>> {
        let result = self.transact(call, "submit_tle", |st, out| {
            authorize(st, call.caller, Role::Validator)?;
            st.market.satellite(satellite_id)?;
            let obs = TleObservation { satellite_id, line1, line2, observed_at, confidence };
            st.oracle
                .submit_tle(call.caller, obs, call.now, st.params.observation_tolerance_secs, out)
        })?;
        if let Some(r) = &result {
            info!(satellite_id, confidence = r.confidence, validators = r.validator_count, "TLE consensus published");
        }
        Ok(result)
    }

    // ========================================================================
    // Router
    // ========================================================================

    pub fn update_price(
        &mut self,
        call: Call,
        token: &TokenId,
        price: Amount,
        timestamp: Timestamp,
        confidence: u8,
    ) -> LedgerResult<()> {
        self.transact(call, "update_price", |st, out| {
            authorize(st, call.caller, Role::PriceFeeder)?;
            let limits = st.params.route_limits();
            st.router.update_price(token, price, timestamp, confidence, call.now, limits, out)
        })
    }

    /// Convert the caller's own funds.
    pub fn swap(
        &mut self,
        call: Call,
        from: &TokenId,
        to: &TokenId,
        amount: Amount,
        expected_out: Option<Amount>,
    ) -> LedgerResult<PaymentReceipt> {
        self.transact(call, "swap", |st, out| {
            let limits = st.params.route_limits();
            st.router
                .execute(from, to, call.caller, call.caller, amount, expected_out, call.now, limits, out)
        })
    }

    /// Pay `to` in the settlement asset from the caller's `from_token` balance.
    pub fn route_payment(
        &mut self,
        call: Call,
        from_token: &TokenId,
        to: Address,
        amount: Amount,
        expected_out: Option<Amount>,
    ) -> LedgerResult<PaymentReceipt> {
        self.transact(call, "route_payment", |st, out| {
            let limits = st.params.route_limits();
            st.router
                .route_payment(from_token, call.caller, to, amount, expected_out, call.now, limits, out)
        })
    }

    pub fn transfer(&mut self, call: Call, token: &TokenId, to: Address, amount: Amount) -> LedgerResult<()> {
        self.transact(call, "transfer", |st, out| st.router.transfer(token, call.caller, to, amount, out))
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub fn register_node(&mut self, call: Call, req: NodeRegistration) -> LedgerResult<NodeId> {
        let id = self.transact(call, "register_node", |st, out| st.register_node(call, req, out))?;
        info!(node_id = id, owner = %call.caller, "node registered");
        Ok(id)
    }

    pub fn register_satellite(&mut self, call: Call, req: SatelliteRegistration) -> LedgerResult<SatelliteId> {
        let id = self.transact(call, "register_satellite", |st, out| st.register_satellite(call, req, out))?;
        info!(satellite_id = id, owner = %call.caller, "satellite registered");
        Ok(id)
    }

    pub fn deactivate_node(&mut self, call: Call, node_id: NodeId) -> LedgerResult<()> {
        self.transact(call, "deactivate_node", |st, out| st.deactivate_node(call, node_id, out))
    }

    pub fn reactivate_node(&mut self, call: Call, node_id: NodeId, top_up: Amount) -> LedgerResult<()> {
        self.transact(call, "reactivate_node", |st, out| st.reactivate_node(call, node_id, top_up, out))
    }

    pub fn deactivate_satellite(&mut self, call: Call, satellite_id: SatelliteId) -> LedgerResult<()> {
        self.transact(call, "deactivate_satellite", |st, out| {
            st.deactivate_satellite(call, satellite_id, out)
        })
    }

    pub fn update_satellite_tle(
        &mut self,
        call: Call,
        satellite_id: SatelliteId,
        tle1: String,
        tle2: String,
    ) -> LedgerResult<()> {
        self.transact(call, "update_satellite_tle", |st, out| {
            st.update_satellite_tle(call, satellite_id, tle1, tle2, out)
        })
    }

    pub fn withdraw_node_stake(&mut self, call: Call, node_id: NodeId) -> LedgerResult<Amount> {
        self.transact(call, "withdraw_node_stake", |st, out| st.withdraw_node_stake(call, node_id, out))
    }

    pub fn withdraw_satellite_stake(&mut self, call: Call, satellite_id: SatelliteId) -> LedgerResult<Amount> {
        self.transact(call, "withdraw_satellite_stake", |st, out| {
            st.withdraw_satellite_stake(call, satellite_id, out)
        })
    }

    pub fn report_uptime(&mut self, call: Call, node_id: NodeId, uptime: u8) -> LedgerResult<()> {
        self.transact(call, "report_uptime", |st, out| st.report_uptime(call, node_id, uptime, out))
    }

    // ========================================================================
    // Passes
    // ========================================================================

    pub fn book_pass(&mut self, call: Call, req: BookingRequest) -> LedgerResult<PassId> {
        let (node_id, satellite_id, start) = (req.node_id, req.satellite_id, req.start_time);
        let id = self.transact(call, "book_pass", |st, out| st.book_pass(call, req, out))?;
        info!(pass_id = id, node_id, satellite_id, start, "pass booked");
        Ok(id)
    }

    pub fn confirm_pass(&mut self, call: Call, pass_id: PassId) -> LedgerResult<()> {
        self.transact(call, "confirm_pass", |st, out| st.confirm_pass(call, pass_id, out))?;
        info!(pass_id, "pass confirmed");
        Ok(())
    }

    /// Returns the refunded amount.
    pub fn cancel_pass(&mut self, call: Call, pass_id: PassId) -> LedgerResult<Amount> {
        let refund = self.transact(call, "cancel_pass", |st, out| st.cancel_pass(call, pass_id, out))?;
        info!(pass_id, refund, by = %call.caller, "pass cancelled");
        Ok(refund)
    }

    pub fn complete_pass(
        &mut self,
        call: Call,
        pass_id: PassId,
        proof_hash: [u8; 32],
        telemetry: RelayTelemetry,
    ) -> LedgerResult<()> {
        self.transact(call, "complete_pass", |st, out| {
            st.complete_pass(call, pass_id, proof_hash, telemetry, out)
        })?;
        info!(pass_id, bytes = telemetry.bytes_relayed, "pass completed");
        Ok(())
    }

    pub fn submit_attestation(&mut self, call: Call, pass_id: PassId, valid: bool) -> LedgerResult<PassState> {
        let state = self.transact(call, "submit_attestation", |st, out| {
            st.submit_attestation(call, pass_id, valid, out)
        })?;
        info!(pass_id, valid, %state, "attestation applied");
        Ok(state)
    }

    /// Commit any time-gated transition that is due. Anyone may call this.
    pub fn sync_pass(&mut self, call: Call, pass_id: PassId) -> LedgerResult<Pass> {
        self.transact(call, "sync_pass", |st, out| {
            st.advance_pass(pass_id, call.now, out)?;
            st.market.pass(pass_id).cloned()
        })
    }

    pub fn claim_reward(
        &mut self,
        call: Call,
        pass_id: PassId,
        expected_payout: Option<Amount>,
    ) -> LedgerResult<RewardReceipt> {
        let receipt = self.transact(call, "claim_reward", |st, out| {
            st.claim_reward(call, pass_id, expected_payout, out)
        })?;
        info!(pass_id, payout = receipt.payout, reward = receipt.reward, "reward claimed");
        Ok(receipt)
    }

    // ========================================================================
    // Credit
    // ========================================================================

    pub fn boost_credit(&mut self, call: Call, user: Address, points: u16) -> LedgerResult<u16> {
        self.transact(call, "boost_credit", |st, out| {
            authorize(st, call.caller, Role::AuthorizedCaller)?;
            st.credit.boost(call.caller, user, points, out)
        })
    }

    pub fn record_relay_completion(&mut self, call: Call, user: Address) -> LedgerResult<u16> {
        self.transact(call, "record_relay_completion", |st, out| {
            authorize(st, call.caller, Role::AuthorizedCaller)?;
            let increment = st.params.credit_increment;
            st.credit.record_relay_completion(call.caller, user, increment, out)
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.state.params
    }

    pub fn governance(&self) -> Address {
        self.state.roles.governance
    }

    pub fn node(&self, id: NodeId) -> LedgerResult<&Node> {
        self.state.market.node(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.state.market.nodes()
    }

    pub fn satellite(&self, id: SatelliteId) -> LedgerResult<&Satellite> {
        self.state.market.satellite(id)
    }

    pub fn satellites(&self) -> impl Iterator<Item = &Satellite> {
        self.state.market.satellites()
    }

    /// The pass as last committed. See [`Ledger::pass_state`] for the state
    /// including transitions that are due but not yet synced.
    pub fn pass(&self, id: PassId) -> LedgerResult<&Pass> {
        self.state.market.pass(id)
    }

    pub fn pass_state(&self, id: PassId, now: Timestamp) -> LedgerResult<PassState> {
        Ok(self.state.market.pass(id)?.effective_state(now, &self.state.params))
    }

    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.state.market.passes()
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.state.oracle.validators()
    }

    pub fn consensus(&self, satellite_id: SatelliteId) -> Option<&ConsensusResult> {
        self.state.oracle.consensus(satellite_id)
    }

    pub fn validated_tle(&self, satellite_id: SatelliteId) -> LedgerResult<&ConsensusResult> {
        self.state.oracle.validated_tle(satellite_id)
    }

    pub fn is_tle_fresh(&self, satellite_id: SatelliteId, now: Timestamp) -> bool {
        self.state
            .oracle
            .is_tle_fresh(satellite_id, now, self.state.params.tle_max_age_secs)
    }

    pub fn token(&self, token: &TokenId) -> Option<&TokenInfo> {
        self.state.router.token(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.state.router.tokens()
    }

    pub fn calculate_swap(
        &self,
        from: &TokenId,
        to: &TokenId,
        amount: Amount,
        now: Timestamp,
    ) -> LedgerResult<SwapQuote> {
        self.state
            .router
            .calculate_swap(from, to, amount, now, self.state.params.route_limits())
    }

    pub fn balance_of(&self, token: &TokenId, owner: &Address) -> Amount {
        self.state.router.balance_of(token, owner)
    }

    pub fn credit_score(&self, user: &Address) -> u16 {
        self.state.credit.score(user)
    }

    pub fn check_bnpl_eligibility(&self, user: &Address, amount: Amount) -> BnplEligibility {
        self.state
            .credit
            .check_bnpl_eligibility(user, amount, self.state.params.bnpl_limit_per_point)
    }

    pub fn pending_attestations(&self, now: Timestamp) -> Vec<AttestationRequest> {
        self.state.pending_attestations(now)
    }

    pub fn due_passes(&self, now: Timestamp) -> Vec<PassId> {
        self.state.due_passes(now)
    }

    pub fn events_since(&self, seq: u64) -> &[EventRecord] {
        self.log.since(seq)
    }

    pub fn last_seq(&self) -> u64 {
        self.log.last_seq()
    }
}
