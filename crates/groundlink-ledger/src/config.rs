//! Protocol parameters and genesis state.
//!
//! Every window, threshold and economic rate the ledger enforces lives in
//! [`ProtocolParams`]. Each field has a default, so a genesis file only needs
//! to name what it changes.

use serde::{Deserialize, Serialize};

use groundlink_protocol::{
    constants::*, Address, Amount, LedgerError, LedgerResult, Timestamp, TokenId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Confirmed passes lock this many seconds before their start.
    pub lock_window_secs:           u64,
    /// Seconds after completion during which an attestation may arrive.
    pub dispute_window_secs:        u64,
    /// Seconds a node operator has to confirm a booking (capped at the lock boundary).
    pub confirmation_window_secs:   u64,
    pub tle_max_age_secs:           u64,
    pub observation_tolerance_secs: u64,
    pub min_validators:             u32,
    pub min_confidence:             u8,

    pub min_node_stake:      Amount,
    pub min_satellite_stake: Amount,
    pub relay_reward:        Amount,
    pub credit_increment:    u16,

    pub slippage_tolerance_bps: u16,
    pub min_route_confidence:   u8,
    pub max_price_age_secs:     u64,
    pub protocol_fee_bps:       u16,

    /// Share of node stake slashed when a completed pass fails verification.
    pub slash_bps:        u16,
    /// Share of the slashed amount paid to the satellite operator.
    pub slash_reward_bps: u16,

    pub bnpl_limit_per_point: Amount,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            lock_window_secs:           DEFAULT_LOCK_WINDOW_SECS,
            dispute_window_secs:        DEFAULT_DISPUTE_WINDOW_SECS,
            confirmation_window_secs:   DEFAULT_CONFIRMATION_WINDOW_SECS,
            tle_max_age_secs:           DEFAULT_TLE_MAX_AGE_SECS,
            observation_tolerance_secs: DEFAULT_OBSERVATION_TOLERANCE_SECS,
            min_validators:             DEFAULT_MIN_VALIDATORS,
            min_confidence:             DEFAULT_MIN_CONFIDENCE,
            min_node_stake:             DEFAULT_MIN_NODE_STAKE,
            min_satellite_stake:        DEFAULT_MIN_SATELLITE_STAKE,
            relay_reward:               DEFAULT_RELAY_REWARD,
            credit_increment:           DEFAULT_CREDIT_INCREMENT,
            slippage_tolerance_bps:     DEFAULT_SLIPPAGE_TOLERANCE_BPS,
            min_route_confidence:       DEFAULT_MIN_ROUTE_CONFIDENCE,
            max_price_age_secs:         DEFAULT_MAX_PRICE_AGE_SECS,
            protocol_fee_bps:           DEFAULT_PROTOCOL_FEE_BPS,
            slash_bps:                  DEFAULT_SLASH_BPS,
            slash_reward_bps:           DEFAULT_SLASH_REWARD_BPS,
            bnpl_limit_per_point:       DEFAULT_BNPL_LIMIT_PER_POINT,
        }
    }
}

impl ProtocolParams {
    pub fn validate(&self) -> LedgerResult<()> {
        let bps = [
            ("slippage_tolerance_bps", self.slippage_tolerance_bps),
            ("protocol_fee_bps", self.protocol_fee_bps),
            ("slash_bps", self.slash_bps),
            ("slash_reward_bps", self.slash_reward_bps),
        ];
        for (name, value) in bps {
            if u128::from(value) > BPS_DENOMINATOR {
                return Err(invalid(format!("{name} {value} exceeds {BPS_DENOMINATOR}")));
            }
        }
        let confidences = [
            ("min_confidence", self.min_confidence),
            ("min_route_confidence", self.min_route_confidence),
        ];
        for (name, value) in confidences {
            if value > MAX_CONFIDENCE {
                return Err(invalid(format!("{name} {value} exceeds {MAX_CONFIDENCE}")));
            }
        }
        let windows = [
            ("lock_window_secs", self.lock_window_secs),
            ("dispute_window_secs", self.dispute_window_secs),
            ("confirmation_window_secs", self.confirmation_window_secs),
            ("tle_max_age_secs", self.tle_max_age_secs),
            ("max_price_age_secs", self.max_price_age_secs),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(invalid(format!("{name} must be non-zero")));
            }
        }
        if self.min_validators == 0 {
            return Err(invalid("min_validators must be at least 1".into()));
        }
        if self.credit_increment > MAX_CREDIT_SCORE {
            return Err(invalid(format!(
                "credit_increment {} exceeds {MAX_CREDIT_SCORE}",
                self.credit_increment
            )));
        }
        Ok(())
    }

    pub(crate) fn route_limits(&self) -> RouteLimits {
        RouteLimits {
            slippage_tolerance_bps: self.slippage_tolerance_bps,
            min_confidence:         self.min_route_confidence,
            max_price_age_secs:     self.max_price_age_secs,
            future_tolerance_secs:  self.observation_tolerance_secs,
        }
    }
}

/// The subset of params the router checks on every conversion.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimits {
    pub slippage_tolerance_bps: u16,
    pub min_confidence:         u8,
    pub max_price_age_secs:     u64,
    pub future_tolerance_secs:  u64,
}

fn invalid(msg: String) -> LedgerError {
    LedgerError::InvalidParameter(msg)
}

// ============================================================================
// Genesis
// ============================================================================

/// Asset registered at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub token:          TokenId,
    pub decimals:       u8,
    #[serde(default)]
    pub is_native:      bool,
    #[serde(default)]
    pub price_feed_ref: String,
    /// Initial USD price (8 decimals); 0 leaves the token unpriced.
    #[serde(default)]
    pub price:          Amount,
    #[serde(default = "default_token_min_confidence")]
    pub min_confidence: u8,
}

fn default_token_min_confidence() -> u8 {
    DEFAULT_MIN_CONFIDENCE
}

/// Balance credited at genesis, e.g. to fund the reward pool or router reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub token:   TokenId,
    pub address: Address,
    pub amount:  Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub governance:    Address,
    #[serde(default)]
    pub params:        ProtocolParams,
    #[serde(default)]
    pub tokens:        Vec<TokenSpec>,
    #[serde(default)]
    pub balances:      Vec<GenesisBalance>,
    #[serde(default)]
    pub validators:    Vec<Address>,
    #[serde(default)]
    pub attestors:     Vec<Address>,
    #[serde(default)]
    pub price_feeders: Vec<Address>,
    /// Clock value stamped on genesis prices and events.
    #[serde(default)]
    pub timestamp:     Timestamp,
}

impl Genesis {
    /// Minimal genesis: governance only, default params, nothing registered.
    pub fn new(governance: Address) -> Self {
        Self {
            governance,
            params: ProtocolParams::default(),
            tokens: Vec::new(),
            balances: Vec::new(),
            validators: Vec::new(),
            attestors: Vec::new(),
            price_feeders: Vec::new(),
            timestamp: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
