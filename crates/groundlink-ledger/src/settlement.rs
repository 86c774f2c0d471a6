//! Payouts for verified passes and unwinding of unverified ones.

use serde::Serialize;

use groundlink_protocol::{
    Address, Amount, CancelReason, DisputeReason, LedgerError, LedgerEvent, LedgerResult, NodeId, PassId,
    PassState, Timestamp, TokenId,
};

use crate::{
    auth::{authorize, Role},
    events::Outbox,
    ledger::{Call, LedgerState},
    marketplace::Pass,
    router::bps_of,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardReceipt {
    pub pass_id:       PassId,
    pub node_operator: Address,
    /// Settlement asset the booking payment was routed into.
    pub payout_token:  TokenId,
    pub payout:        Amount,
    /// Protocol fee, in the booking token.
    pub fee:           Amount,
    /// Fixed relay reward, in the settlement asset.
    pub reward:        Amount,
    pub credit_score:  u16,
}

impl LedgerState {
    /// Settle a verified pass: fee to treasury, the rest of the escrowed
    /// payment routed to the node operator, plus the fixed relay reward.
    ///
    /// `expected_payout` bounds slippage on the routed leg; without it the
    /// operator accepts the current price.
    pub(crate) fn claim_reward(
        &mut self,
        call: Call,
        pass_id: PassId,
        expected_payout: Option<Amount>,
        out: &mut Outbox,
    ) -> LedgerResult<RewardReceipt> {
        authorize(self, call.caller, Role::PassNodeOperator(pass_id))?;
        let pass = self.market.pass(pass_id)?;
        match pass.state {
            PassState::Verified => {}
            PassState::Settled => return Err(LedgerError::AlreadySettled(pass_id)),
            PassState::Cancelled => return Err(LedgerError::AlreadyCancelled(pass_id)),
            current => {
                return Err(LedgerError::InvalidState {
                    pass_id,
                    current,
                    expected: PassState::Verified,
                })
            }
        }
        let (token, amount, operator) =
            (pass.payment_token.clone(), pass.payment_amount, pass.node_owner);

        let pass = self.market.pass_mut(pass_id)?;
        pass.state = PassState::Settled;
        pass.settled_at = Some(call.now);

        let native = self.router.native_token()?.clone();
        let fee = bps_of(amount, self.params.protocol_fee_bps)?;
        self.router.move_funds(&token, Address::ESCROW, Address::TREASURY, fee)?;

        let routed = amount - fee;
        let payout = if routed == 0 {
            0
        } else {
            self.router
                .execute(
                    &token,
                    &native,
                    Address::ESCROW,
                    operator,
                    routed,
                    expected_payout,
                    call.now,
                    self.params.route_limits(),
                    out,
                )?
                .amount_out
        };

        let reward = self.params.relay_reward;
        self.router.move_funds(&native, Address::REWARD_POOL, operator, reward)?;

        let credit_score = match self.params.credit_increment {
            0 => self.credit.score(&operator),
            increment => {
                self.credit
                    .record_relay_completion(Address::MARKETPLACE, operator, increment, out)?
            }
        };

        out.emit(LedgerEvent::RewardClaimed {
            pass_id,
            node_operator: operator,
            payout_token: native.clone(),
            payout,
            fee,
            reward,
        });
        Ok(RewardReceipt {
            pass_id,
            node_operator: operator,
            payout_token: native,
            payout,
            fee,
            reward,
            credit_score,
        })
    }

    /// Dispute window elapsed without verification. The payer is refunded in
    /// full. The node's stake is slashed only when the open dispute blames
    /// the relay itself.
    pub(crate) fn expire_unverified(&mut self, pass_id: PassId, now: Timestamp, out: &mut Outbox) -> LedgerResult<()> {
        let reason = match self.market.pass(pass_id)?.dispute.map(|d| d.reason) {
            Some(DisputeReason::AttestationRejected | DisputeReason::OutsidePassWindow) => {
                CancelReason::VerificationFailed
            }
            Some(DisputeReason::StaleTle) => CancelReason::TleUnavailable,
            None => CancelReason::AttestationTimeout,
        };
        let pass = self.market.pass_mut(pass_id)?;
        pass.state = PassState::Cancelled;
        pass.cancel_reason = Some(reason);
        let pass = pass.clone();

        self.router
            .move_funds(&pass.payment_token, Address::ESCROW, pass.operator, pass.payment_amount)?;
        out.emit(LedgerEvent::PassCancelled {
            pass_id,
            reason,
            refund: pass.payment_amount,
        });
        tracing::debug!(pass_id, ?reason, now, "unverified pass unwound");

        if reason == CancelReason::VerificationFailed {
            self.slash_node(&pass, out)?;
        }
        Ok(())
    }

    fn slash_node(&mut self, pass: &Pass, out: &mut Outbox) -> LedgerResult<()> {
        let node_id: NodeId = pass.node_id;
        let stake = self.market.node(node_id)?.stake_amount;
        let slashed = bps_of(stake, self.params.slash_bps)?;
        if slashed == 0 {
            return Ok(());
        }
        let to_satellite_operator = bps_of(slashed, self.params.slash_reward_bps)?;
        let to_treasury = slashed - to_satellite_operator;

        let native = self.router.native_token()?.clone();
        self.router
            .move_funds(&native, Address::STAKE_VAULT, pass.operator, to_satellite_operator)?;
        self.router
            .move_funds(&native, Address::STAKE_VAULT, Address::TREASURY, to_treasury)?;

        let min_stake = self.params.min_node_stake;
        let node = self.market.node_mut(node_id)?;
        node.stake_amount -= slashed;
        let deactivated = node.active && node.stake_amount < min_stake;
        if deactivated {
            node.active = false;
        }

        out.emit(LedgerEvent::StakeSlashed {
            node_id,
            pass_id: pass.id,
            amount: slashed,
            to_satellite_operator,
            to_treasury,
        });
        if deactivated {
            out.emit(LedgerEvent::NodeDeactivated { node_id });
        }
        Ok(())
    }
}
