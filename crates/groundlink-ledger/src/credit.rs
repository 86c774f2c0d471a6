use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use groundlink_protocol::{
    constants::{BNPL_SCORE_FLOOR, MAX_CREDIT_SCORE},
    Address, Amount, LedgerError, LedgerEvent, LedgerResult,
};

use crate::events::Outbox;

/// Bounded reputation scores and the callers allowed to raise them.
///
/// The marketplace itself is always authorized: settlement records relay
/// completions through it.
#[derive(Debug, Clone)]
pub struct CreditRegistry {
    scores:     BTreeMap<Address, u16>,
    authorized: BTreeSet<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BnplEligibility {
    pub score:    u16,
    pub limit:    Amount,
    pub eligible: bool,
}

impl Default for CreditRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CreditRegistry {
    pub fn new() -> Self {
        Self {
            scores:     BTreeMap::new(),
            authorized: BTreeSet::from([Address::MARKETPLACE]),
        }
    }

    pub fn score(&self, user: &Address) -> u16 {
        self.scores.get(user).copied().unwrap_or(0)
    }

    pub fn is_authorized(&self, caller: &Address) -> bool {
        self.authorized.contains(caller)
    }

    pub fn authorized_callers(&self) -> impl Iterator<Item = &Address> {
        self.authorized.iter()
    }

    pub fn set_authorized_caller(&mut self, caller: Address, authorized: bool, out: &mut Outbox) -> LedgerResult<()> {
        if caller == Address::MARKETPLACE && !authorized {
            return Err(LedgerError::InvalidParameter(
                "the marketplace cannot be deauthorized".into(),
            ));
        }
        if authorized {
            self.authorized.insert(caller);
        } else {
            self.authorized.remove(&caller);
        }
        out.emit(LedgerEvent::AuthorizedCallerSet { caller, authorized });
        Ok(())
    }

    /// Raise `user`'s score by `points`, saturating at the cap.
    pub fn boost(&mut self, caller: Address, user: Address, points: u16, out: &mut Outbox) -> LedgerResult<u16> {
        if !self.is_authorized(&caller) {
            return Err(LedgerError::NotAuthorizedCaller);
        }
        if points == 0 {
            return Err(LedgerError::InvalidParameter("points must be non-zero".into()));
        }
        let score = self.scores.entry(user).or_insert(0);
        *score = score.saturating_add(points).min(MAX_CREDIT_SCORE);
        let score = *score;
        out.emit(LedgerEvent::CreditBoosted { user, points, score });
        Ok(score)
    }

    pub fn record_relay_completion(
        &mut self,
        caller: Address,
        user: Address,
        increment: u16,
        out: &mut Outbox,
    ) -> LedgerResult<u16> {
        self.boost(caller, user, increment, out)
    }

    /// Eligible iff the score reaches the floor and `0 < amount ≤ limit`,
    /// where the limit grows linearly with each point above the floor.
    pub fn check_bnpl_eligibility(&self, user: &Address, amount: Amount, limit_per_point: Amount) -> BnplEligibility {
        let score = self.score(user);
        let points_above = u128::from(score.saturating_sub(BNPL_SCORE_FLOOR));
        let limit = points_above.saturating_mul(limit_per_point);
        let eligible = score >= BNPL_SCORE_FLOOR && amount > 0 && amount <= limit;
        BnplEligibility { score, limit, eligible }
    }
}
