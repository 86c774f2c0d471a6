//! Pass state machine.
//!
//! ```text
//! Booked ──confirm──▶ Confirmed ──(lock boundary)──▶ Locked ──complete──▶ Completed
//!   │                    │                                                  │
//!   └─cancel─▶ Cancelled ◀─cancel                    attest ok ─▶ Verified ─┤
//!                        ◀──────────── dispute window elapsed ──────────────┘
//! ```
//!
//! Time-gated edges (lock, dispute expiry) are taken lazily by
//! [`LedgerState::advance_pass`] whenever an operation touches the pass.

use groundlink_protocol::{
    validation::{is_within_window, validate_duration},
    Address, Amount, AttestationRequest, CancelReason, DisputeReason, LedgerError, LedgerEvent,
    LedgerResult, PassId, PassState, Timestamp,
};

use crate::{
    auth::{authorize, Role},
    events::Outbox,
    ledger::{Call, LedgerState},
    marketplace::{BookingRequest, Dispute, Pass, RelayTelemetry},
    router::bps_of,
};

impl LedgerState {
    pub(crate) fn book_pass(&mut self, call: Call, req: BookingRequest, out: &mut Outbox) -> LedgerResult<PassId> {
        validate_duration(req.duration_minutes)?;
        authorize(self, call.caller, Role::SatelliteOwner(req.satellite_id))?;

        let node = self.market.node(req.node_id)?;
        if !node.active {
            return Err(LedgerError::NodeInactive(req.node_id));
        }
        let node_owner = node.owner;
        if !self.market.satellite(req.satellite_id)?.active {
            return Err(LedgerError::SatelliteInactive(req.satellite_id));
        }
        if req.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let lock_window = self.params.lock_window_secs;
        let lock_boundary = req
            .start_time
            .checked_sub(lock_window)
            .filter(|boundary| *boundary > call.now)
            .ok_or(LedgerError::StartTooSoon { start_time: req.start_time })?;
        let end = req
            .start_time
            .saturating_add(u64::from(req.duration_minutes) * 60);
        if let Some(conflicting) = self.market.conflicting_pass(req.node_id, req.start_time, end) {
            return Err(LedgerError::NodeBusy { node_id: req.node_id, conflicting });
        }

        // Price the settlement leg now: a non-native payment needs a usable
        // route at booking, and the quote is kept for reference.
        let native = self.router.native_token()?.clone();
        let fee = bps_of(req.amount, self.params.protocol_fee_bps)?;
        let quoted_settlement = self
            .router
            .calculate_swap(&req.token, &native, req.amount - fee, call.now, self.params.route_limits())?
            .expected_out;

        self.router.move_funds(&req.token, call.caller, Address::ESCROW, req.amount)?;

        let confirm_deadline = call
            .now
            .saturating_add(self.params.confirmation_window_secs)
            .min(lock_boundary);
        let operator = call.caller;
        let pass_id = self.market.insert_pass(|id| Pass {
            id,
            operator,
            node_id: req.node_id,
            satellite_id: req.satellite_id,
            node_owner,
            start_time: req.start_time,
            duration_minutes: req.duration_minutes,
            payment_token: req.token.clone(),
            payment_amount: req.amount,
            quoted_settlement,
            proof_hash: [0u8; 32],
            state: PassState::Booked,
            created_at: call.now,
            confirm_deadline,
            confirmed_at: None,
            locked_at: None,
            telemetry: None,
            completed_at: None,
            attestation: None,
            dispute: None,
            verified_at: None,
            settled_at: None,
            cancel_reason: None,
        });
        out.emit(LedgerEvent::PassBooked {
            pass_id,
            node_id: req.node_id,
            satellite_id: req.satellite_id,
            operator,
            start_time: req.start_time,
            duration_minutes: req.duration_minutes,
            token: req.token,
            amount: req.amount,
        });
        Ok(pass_id)
    }

    pub(crate) fn confirm_pass(&mut self, call: Call, pass_id: PassId, out: &mut Outbox) -> LedgerResult<()> {
        authorize(self, call.caller, Role::PassNodeOperator(pass_id))?;
        let state = self.advance_pass(pass_id, call.now, out)?;
        expect_state(pass_id, state, PassState::Booked)?;

        let pass = self.market.pass_mut(pass_id)?;
        if call.now > pass.confirm_deadline {
            return Err(LedgerError::DeadlinePassed { pass_id, deadline: pass.confirm_deadline });
        }
        pass.state = PassState::Confirmed;
        pass.confirmed_at = Some(call.now);
        out.emit(LedgerEvent::PassConfirmed { pass_id });
        Ok(())
    }

    /// Counterparty cancellation with a full refund in the original token.
    pub(crate) fn cancel_pass(&mut self, call: Call, pass_id: PassId, out: &mut Outbox) -> LedgerResult<Amount> {
        authorize(self, call.caller, Role::PassCounterparty(pass_id))?;
        let state = self.advance_pass(pass_id, call.now, out)?;
        match state {
            PassState::Booked | PassState::Confirmed => {}
            PassState::Cancelled => return Err(LedgerError::AlreadyCancelled(pass_id)),
            PassState::Settled => return Err(LedgerError::AlreadySettled(pass_id)),
            PassState::Locked | PassState::Completed | PassState::Verified => {
                let lock_boundary = self
                    .market
                    .pass(pass_id)?
                    .lock_boundary(self.params.lock_window_secs);
                return Err(LedgerError::LockWindowReached { pass_id, lock_boundary });
            }
        }

        let reason = CancelReason::Counterparty { by: call.caller };
        let pass = self.market.pass_mut(pass_id)?;
        pass.state = PassState::Cancelled;
        pass.cancel_reason = Some(reason);
        let (token, amount, payer) = (pass.payment_token.clone(), pass.payment_amount, pass.operator);

        self.router.move_funds(&token, Address::ESCROW, payer, amount)?;
        out.emit(LedgerEvent::PassCancelled { pass_id, reason, refund: amount });
        Ok(amount)
    }

    pub(crate) fn complete_pass(
        &mut self,
        call: Call,
        pass_id: PassId,
        proof_hash: [u8; 32],
        telemetry: RelayTelemetry,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        authorize(self, call.caller, Role::PassNodeOperator(pass_id))?;
        let state = self.advance_pass(pass_id, call.now, out)?;
        expect_state(pass_id, state, PassState::Locked)?;

        if proof_hash == [0u8; 32] {
            return Err(LedgerError::InvalidParameter("proof hash must be non-zero".into()));
        }
        if telemetry.relay_timestamp > call.now {
            return Err(LedgerError::InvalidParameter(format!(
                "relay timestamp {} is in the future",
                telemetry.relay_timestamp
            )));
        }
        let pass = self.market.pass_mut(pass_id)?;
        let end = pass.end_time();
        if call.now < end {
            return Err(LedgerError::TooEarly { allowed_at: end, now: call.now });
        }
        pass.proof_hash = proof_hash;
        pass.telemetry = Some(telemetry);
        pass.completed_at = Some(call.now);
        pass.state = PassState::Completed;
        out.emit(LedgerEvent::PassCompleted { pass_id, proof_hash });
        Ok(())
    }

    /// Apply an attestation verdict to a completed pass.
    ///
    /// The pass is verified only if the verdict is positive, the relay
    /// happened inside the booked window and the satellite's consensus TLE is
    /// fresh. Anything else opens (or updates) a dispute; a later positive
    /// verdict inside the dispute window clears it.
    pub(crate) fn submit_attestation(
        &mut self,
        call: Call,
        pass_id: PassId,
        valid: bool,
        out: &mut Outbox,
    ) -> LedgerResult<PassState> {
        authorize(self, call.caller, Role::Attestor)?;
        let pass = self.market.pass(pass_id)?;
        expect_state(pass_id, pass.state, PassState::Completed)?;
        if pass
            .dispute_deadline(self.params.dispute_window_secs)
            .is_some_and(|deadline| call.now > deadline)
        {
            return Err(LedgerError::DisputeWindowClosed(pass_id));
        }

        let in_window = pass
            .telemetry
            .is_some_and(|t| is_within_window(t.relay_timestamp, pass.start_time, pass.duration_minutes));
        let (satellite_id, node_id) = (pass.satellite_id, pass.node_id);

        let failure = if !valid {
            Some(DisputeReason::AttestationRejected)
        } else if !in_window {
            Some(DisputeReason::OutsidePassWindow)
        } else if !self
            .oracle
            .check_freshness(satellite_id, call.now, self.params.tle_max_age_secs, out)
        {
            Some(DisputeReason::StaleTle)
        } else {
            None
        };

        let pass = self.market.pass_mut(pass_id)?;
        pass.attestation = Some(valid);
        match failure {
            None => {
                pass.state = PassState::Verified;
                pass.verified_at = Some(call.now);
                pass.dispute = None;
                self.market.node_mut(node_id)?.total_relays += 1;
                out.emit(LedgerEvent::PassVerified { pass_id });
                Ok(PassState::Verified)
            }
            Some(reason) => {
                if pass.dispute.map_or(true, |d| d.reason != reason) {
                    pass.dispute = Some(Dispute { reason, opened_at: call.now });
                    out.emit(LedgerEvent::PassDisputed { pass_id, reason });
                }
                Ok(PassState::Completed)
            }
        }
    }

    /// Take whichever time-gated transition is due for the pass at `now`.
    pub(crate) fn advance_pass(&mut self, pass_id: PassId, now: Timestamp, out: &mut Outbox) -> LedgerResult<PassState> {
        let pass = self.market.pass(pass_id)?;
        let due = pass.effective_state(now, &self.params);
        match (pass.state, due) {
            (PassState::Confirmed, PassState::Locked) => {
                let pass = self.market.pass_mut(pass_id)?;
                pass.state = PassState::Locked;
                pass.locked_at = Some(now);
                out.emit(LedgerEvent::PassLocked { pass_id });
                Ok(PassState::Locked)
            }
            (PassState::Completed, PassState::Cancelled) => {
                self.expire_unverified(pass_id, now, out)?;
                Ok(PassState::Cancelled)
            }
            (current, _) => Ok(current),
        }
    }

    /// Passes for which [`advance_pass`](Self::advance_pass) would change state.
    pub fn due_passes(&self, now: Timestamp) -> Vec<PassId> {
        self.market
            .passes()
            .filter(|p| p.effective_state(now, &self.params) != p.state)
            .map(|p| p.id)
            .collect()
    }

    /// Completed passes still waiting for a usable attestation: none has
    /// arrived yet, or the last one could not be checked for want of a fresh
    /// consensus TLE.
    pub fn pending_attestations(&self, now: Timestamp) -> Vec<AttestationRequest> {
        let window = self.params.dispute_window_secs;
        self.market
            .passes()
            .filter(|p| p.state == PassState::Completed)
            .filter(|p| {
                p.attestation.is_none() || p.dispute.is_some_and(|d| d.reason == DisputeReason::StaleTle)
            })
            .filter(|p| p.dispute_deadline(window).is_some_and(|deadline| now <= deadline))
            .filter_map(Pass::attestation_request)
            .collect()
    }
}

/// Reject anything but `expected`, naming terminal states explicitly.
fn expect_state(pass_id: PassId, current: PassState, expected: PassState) -> LedgerResult<()> {
    match current {
        s if s == expected => Ok(()),
        PassState::Cancelled => Err(LedgerError::AlreadyCancelled(pass_id)),
        PassState::Settled => Err(LedgerError::AlreadySettled(pass_id)),
        current => Err(LedgerError::InvalidState { pass_id, current, expected }),
    }
}
