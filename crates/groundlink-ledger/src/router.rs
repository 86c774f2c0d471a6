//! Asset registry, balances and price conversion.
//!
//! Prices are USD with [`PRICE_DECIMALS`] decimals. Every conversion goes
//! through the native asset: `X → native → Y`, one floor-rounded hop at a
//! time. Conversions settle against the router reserve account, so the
//! reserve must hold the output asset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use groundlink_protocol::{
    constants::{BPS_DENOMINATOR, MAX_CONFIDENCE, MAX_TOKEN_DECIMALS},
    Address, Amount, LedgerError, LedgerEvent, LedgerResult, Timestamp, TokenId,
};

use crate::{config::RouteLimits, events::Outbox};

pub use groundlink_protocol::constants::PRICE_DECIMALS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub token:             TokenId,
    pub supported:         bool,
    pub is_native:         bool,
    pub decimals:          u8,
    pub price_feed_ref:    String,
    pub cached_price:      Amount,
    pub oracle_confidence: u8,
    pub price_updated_at:  Timestamp,
    /// Oracle updates below this confidence are refused.
    pub min_confidence:    u8,
    /// The cached price came from the governance override.
    pub emergency:         bool,
}

/// Token registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewToken {
    pub token:          TokenId,
    pub decimals:       u8,
    #[serde(default)]
    pub is_native:      bool,
    #[serde(default)]
    pub price_feed_ref: String,
    pub min_confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapQuote {
    pub from_token:   TokenId,
    pub to_token:     TokenId,
    pub amount_in:    Amount,
    pub expected_out: Amount,
    /// Assets visited, source first.
    pub route:        Vec<TokenId>,
    pub description:  String,
    /// Lowest oracle confidence among the prices used (0 if any was an override).
    pub confidence:   u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub from_token: TokenId,
    pub to_token:   TokenId,
    pub from:       Address,
    pub to:         Address,
    pub amount_in:  Amount,
    pub amount_out: Amount,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentRouter {
    tokens:   BTreeMap<TokenId, TokenInfo>,
    native:   Option<TokenId>,
    balances: BTreeMap<(TokenId, Address), Amount>,
}

impl PaymentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    pub fn register_token(&mut self, spec: NewToken, out: &mut Outbox) -> LedgerResult<()> {
        if self.tokens.contains_key(&spec.token) {
            return Err(LedgerError::TokenAlreadyRegistered(spec.token));
        }
        if spec.is_native && self.native.is_some() {
            return Err(LedgerError::NativeAlreadyRegistered);
        }
        if spec.decimals > MAX_TOKEN_DECIMALS {
            return Err(LedgerError::InvalidParameter(format!(
                "decimals {} exceeds {MAX_TOKEN_DECIMALS}",
                spec.decimals
            )));
        }
        if spec.min_confidence > MAX_CONFIDENCE {
            return Err(LedgerError::InvalidConfidence(spec.min_confidence));
        }
        if spec.is_native {
            self.native = Some(spec.token.clone());
        }
        out.emit(LedgerEvent::TokenRegistered {
            token:     spec.token.clone(),
            decimals:  spec.decimals,
            is_native: spec.is_native,
        });
        self.tokens.insert(
            spec.token.clone(),
            TokenInfo {
                token:             spec.token,
                supported:         true,
                is_native:         spec.is_native,
                decimals:          spec.decimals,
                price_feed_ref:    spec.price_feed_ref,
                cached_price:      0,
                oracle_confidence: 0,
                price_updated_at:  0,
                min_confidence:    spec.min_confidence,
                emergency:         false,
            },
        );
        Ok(())
    }

    pub fn set_supported(&mut self, token: &TokenId, supported: bool, out: &mut Outbox) -> LedgerResult<()> {
        let info = self
            .tokens
            .get_mut(token)
            .ok_or_else(|| LedgerError::UnsupportedToken(token.clone()))?;
        info.supported = supported;
        out.emit(LedgerEvent::TokenSupportChanged { token: token.clone(), supported });
        Ok(())
    }

    pub fn token(&self, token: &TokenId) -> Option<&TokenInfo> {
        self.tokens.get(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }

    /// The settlement asset.
    pub fn native_token(&self) -> LedgerResult<&TokenId> {
        self.native
            .as_ref()
            .ok_or_else(|| LedgerError::InvalidParameter("no native asset registered".into()))
    }

    fn supported(&self, token: &TokenId) -> LedgerResult<&TokenInfo> {
        self.tokens
            .get(token)
            .filter(|t| t.supported)
            .ok_or_else(|| LedgerError::UnsupportedToken(token.clone()))
    }

    // ------------------------------------------------------------------------
    // Prices
    // ------------------------------------------------------------------------

    /// Oracle-sourced price update, gated on the token's confidence floor.
    #[allow(clippy::too_many_arguments)]
    pub fn update_price(
        &mut self,
        token: &TokenId,
        price: Amount,
        timestamp: Timestamp,
        confidence: u8,
        now: Timestamp,
        limits: RouteLimits,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        let info = self
            .tokens
            .get_mut(token)
            .ok_or_else(|| LedgerError::UnsupportedToken(token.clone()))?;
        if confidence > MAX_CONFIDENCE {
            return Err(LedgerError::InvalidConfidence(confidence));
        }
        if confidence < info.min_confidence {
            return Err(LedgerError::InsufficientConfidence {
                got:      confidence,
                required: info.min_confidence,
            });
        }
        if price == 0 {
            return Err(LedgerError::InvalidParameter("price must be non-zero".into()));
        }
        if timestamp > now.saturating_add(limits.future_tolerance_secs) {
            return Err(LedgerError::InvalidParameter(format!(
                "price timestamp {timestamp} is ahead of {now}"
            )));
        }
        if info.cached_price != 0 && timestamp <= info.price_updated_at {
            return Err(LedgerError::StalePrice {
                token:      token.clone(),
                updated_at: info.price_updated_at,
            });
        }
        info.cached_price = price;
        info.oracle_confidence = confidence;
        info.price_updated_at = timestamp;
        info.emergency = false;
        out.emit(LedgerEvent::PriceUpdated {
            token: token.clone(),
            price,
            confidence,
            emergency: false,
        });
        Ok(())
    }

    /// Governance override. Recorded with confidence 0.
    pub fn emergency_set_price(
        &mut self,
        token: &TokenId,
        price: Amount,
        now: Timestamp,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        let info = self
            .tokens
            .get_mut(token)
            .ok_or_else(|| LedgerError::UnsupportedToken(token.clone()))?;
        if price == 0 {
            return Err(LedgerError::InvalidParameter("price must be non-zero".into()));
        }
        info.cached_price = price;
        info.oracle_confidence = 0;
        info.price_updated_at = now;
        info.emergency = true;
        out.emit(LedgerEvent::PriceUpdated {
            token: token.clone(),
            price,
            confidence: 0,
            emergency: true,
        });
        Ok(())
    }

    fn usable_price(&self, info: &TokenInfo, now: Timestamp, limits: RouteLimits) -> LedgerResult<Amount> {
        if info.cached_price == 0 {
            return Err(LedgerError::PriceUnavailable(info.token.clone()));
        }
        if info.emergency {
            return Ok(info.cached_price);
        }
        if info.oracle_confidence < limits.min_confidence {
            return Err(LedgerError::InsufficientConfidence {
                got:      info.oracle_confidence,
                required: limits.min_confidence,
            });
        }
        if now.saturating_sub(info.price_updated_at) > limits.max_price_age_secs {
            return Err(LedgerError::StalePrice {
                token:      info.token.clone(),
                updated_at: info.price_updated_at,
            });
        }
        Ok(info.cached_price)
    }

    // ------------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------------

    /// Expected output of converting `amount` of `from` into `to`. Pure read.
    pub fn calculate_swap(
        &self,
        from: &TokenId,
        to: &TokenId,
        amount: Amount,
        now: Timestamp,
        limits: RouteLimits,
    ) -> LedgerResult<SwapQuote> {
        let src = self.supported(from)?;
        let dst = self.supported(to)?;

        if from == to {
            return Ok(SwapQuote {
                from_token:   from.clone(),
                to_token:     to.clone(),
                amount_in:    amount,
                expected_out: amount,
                route:        vec![from.clone()],
                description:  format!("{from} (direct)"),
                confidence:   MAX_CONFIDENCE,
            });
        }

        let native_id = self.native_token()?;
        let native = self.supported(native_id)?;

        let mut route = vec![from.clone()];
        let mut value = amount;
        let mut confidence = MAX_CONFIDENCE;
        let mut hops = Vec::with_capacity(2);
        if !src.is_native {
            hops.push((src, native));
        }
        if !dst.is_native {
            hops.push((native, dst));
        }
        for (a, b) in hops {
            let pa = self.usable_price(a, now, limits)?;
            let pb = self.usable_price(b, now, limits)?;
            confidence = confidence.min(a.oracle_confidence).min(b.oracle_confidence);
            value = convert(value, a.decimals, pa, b.decimals, pb)?;
            route.push(b.token.clone());
        }

        let description = route.iter().map(TokenId::as_str).collect::<Vec<_>>().join(" -> ");
        Ok(SwapQuote {
            from_token: from.clone(),
            to_token: to.clone(),
            amount_in: amount,
            expected_out: value,
            route,
            description,
            confidence,
        })
    }

    /// Convert and move value from `from` to `to`.
    ///
    /// The route is re-evaluated here; when `expected_out` is given, a realized
    /// output deviating from it by more than the slippage tolerance fails.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        from_token: &TokenId,
        to_token: &TokenId,
        from: Address,
        to: Address,
        amount: Amount,
        expected_out: Option<Amount>,
        now: Timestamp,
        limits: RouteLimits,
        out: &mut Outbox,
    ) -> LedgerResult<PaymentReceipt> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let quote = self.calculate_swap(from_token, to_token, amount, now, limits)?;
        if let Some(expected) = expected_out {
            check_slippage(expected, quote.expected_out, limits.slippage_tolerance_bps)?;
        }

        if from_token == to_token {
            self.move_funds(from_token, from, to, amount)?;
        } else {
            self.move_funds(from_token, from, Address::ROUTER_RESERVE, amount)?;
            self.move_funds(to_token, Address::ROUTER_RESERVE, to, quote.expected_out)?;
        }

        out.emit(LedgerEvent::PaymentRouted {
            from_token: from_token.clone(),
            to_token: to_token.clone(),
            from,
            to,
            amount_in: amount,
            amount_out: quote.expected_out,
        });
        Ok(PaymentReceipt {
            from_token: from_token.clone(),
            to_token: to_token.clone(),
            from,
            to,
            amount_in: amount,
            amount_out: quote.expected_out,
        })
    }

    /// Pay `to` in the settlement asset, converting from `from_token` if needed.
    #[allow(clippy::too_many_arguments)]
    pub fn route_payment(
        &mut self,
        from_token: &TokenId,
        from: Address,
        to: Address,
        amount: Amount,
        expected_out: Option<Amount>,
        now: Timestamp,
        limits: RouteLimits,
        out: &mut Outbox,
    ) -> LedgerResult<PaymentReceipt> {
        let native = self.native_token()?.clone();
        self.execute(from_token, &native, from, to, amount, expected_out, now, limits, out)
    }

    // ------------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------------

    pub fn balance_of(&self, token: &TokenId, owner: &Address) -> Amount {
        self.balances.get(&(token.clone(), *owner)).copied().unwrap_or(0)
    }

    /// Credit newly bridged funds.
    pub fn deposit(&mut self, token: &TokenId, to: Address, amount: Amount, out: &mut Outbox) -> LedgerResult<()> {
        if !self.tokens.contains_key(token) {
            return Err(LedgerError::UnsupportedToken(token.clone()));
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let balance = self.balances.entry((token.clone(), to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        out.emit(LedgerEvent::Deposited { token: token.clone(), to, amount });
        Ok(())
    }

    pub fn transfer(
        &mut self,
        token: &TokenId,
        from: Address,
        to: Address,
        amount: Amount,
        out: &mut Outbox,
    ) -> LedgerResult<()> {
        self.supported(token)?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.move_funds(token, from, to, amount)?;
        out.emit(LedgerEvent::Transferred { token: token.clone(), from, to, amount });
        Ok(())
    }

    /// Internal balance move; emits nothing. A zero amount is a no-op.
    pub(crate) fn move_funds(&mut self, token: &TokenId, from: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let have = self.balance_of(token, &from);
        if have < amount {
            return Err(LedgerError::InsufficientBalance {
                token: token.clone(),
                have,
                need: amount,
            });
        }
        let credited = self
            .balance_of(token, &to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert((token.clone(), from), have - amount);
        self.balances.insert((token.clone(), to), credited);
        Ok(())
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

/// `floor(amount · 10^dec_out · p_in / (10^dec_in · p_out))` with checked math.
pub fn convert(amount: Amount, dec_in: u8, p_in: Amount, dec_out: u8, p_out: Amount) -> LedgerResult<Amount> {
    if dec_out >= dec_in {
        let scaled = amount
            .checked_mul(pow10(dec_out - dec_in)?)
            .ok_or(LedgerError::Overflow)?;
        mul_div(scaled, p_in, p_out)
    } else {
        let denom = p_out
            .checked_mul(pow10(dec_in - dec_out)?)
            .ok_or(LedgerError::Overflow)?;
        mul_div(amount, p_in, denom)
    }
}

/// `floor(a · b / c)` without overflowing on the intermediate product when
/// the result itself fits.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> LedgerResult<Amount> {
    if c == 0 {
        return Err(LedgerError::Overflow);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let (q, r) = (a / c, a % c);
    let high = q.checked_mul(b).ok_or(LedgerError::Overflow)?;
    let low = r.checked_mul(b).ok_or(LedgerError::Overflow)? / c;
    high.checked_add(low).ok_or(LedgerError::Overflow)
}

/// `amount · bps / 10_000`, floored.
pub fn bps_of(amount: Amount, bps: u16) -> LedgerResult<Amount> {
    mul_div(amount, u128::from(bps), BPS_DENOMINATOR)
}

fn pow10(exp: u8) -> LedgerResult<Amount> {
    10u128.checked_pow(u32::from(exp)).ok_or(LedgerError::Overflow)
}

fn check_slippage(expected: Amount, realized: Amount, tolerance_bps: u16) -> LedgerResult<()> {
    let deviation = expected.abs_diff(realized);
    let allowed = bps_of(expected, tolerance_bps)?;
    if deviation > allowed {
        return Err(LedgerError::SlippageExceeded { expected, realized, tolerance_bps });
    }
    Ok(())
}
