// ============================================================================
// Protocol constants
// ============================================================================
//
// Tunable economics and windows live in `ProtocolParams` (groundlink-ledger);
// the values here are format invariants and the defaults those params start
// from.

// --- Coordinates ------------------------------------------------------------

/// Coordinates are integers scaled ×10 000 (4 decimal degrees).
pub const COORDINATE_SCALE: i32 = 10_000;

/// ±90.0000° in scaled units.
pub const MAX_LATITUDE: i32 = 90 * COORDINATE_SCALE;

/// ±180.0000° in scaled units.
pub const MAX_LONGITUDE: i32 = 180 * COORDINATE_SCALE;

// --- Passes -----------------------------------------------------------------

pub const MIN_PASS_DURATION_MINUTES: u32 = 5;
pub const MAX_PASS_DURATION_MINUTES: u32 = 10;

/// Lock boundary: confirmed passes lock this long before start (1 hour).
pub const DEFAULT_LOCK_WINDOW_SECS: u64 = 3_600;

/// Dispute window after completion before an unverified pass is unwound (24 hours).
pub const DEFAULT_DISPUTE_WINDOW_SECS: u64 = 86_400;

/// Time a node operator has to confirm a booking (24 hours, capped at the lock boundary).
pub const DEFAULT_CONFIRMATION_WINDOW_SECS: u64 = 86_400;

// --- TLE / oracle -----------------------------------------------------------

/// Every TLE line is exactly 69 characters, the last being the checksum digit.
pub const TLE_LINE_LEN: usize = 69;

/// Confidence scores are percentages.
pub const MAX_CONFIDENCE: u8 = 100;

/// How far in the future an observation timestamp may lie (1 hour).
pub const DEFAULT_OBSERVATION_TOLERANCE_SECS: u64 = 3_600;

/// Consensus TLE is fresh for 7 days after its last update.
pub const DEFAULT_TLE_MAX_AGE_SECS: u64 = 7 * 86_400;

pub const DEFAULT_MIN_VALIDATORS: u32 = 3;
pub const DEFAULT_MIN_CONFIDENCE: u8 = 80;

/// Superseded submissions retained per satellite for audit.
pub const MAX_SUBMISSION_HISTORY: usize = 64;

// --- Prices & routing -------------------------------------------------------

/// Prices are quoted in USD with 8 decimal places.
pub const PRICE_DECIMALS: u8 = 8;

/// Largest decimals value accepted for a registered asset.
pub const MAX_TOKEN_DECIMALS: u8 = 30;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

pub const DEFAULT_SLIPPAGE_TOLERANCE_BPS: u16 = 100;
pub const DEFAULT_MIN_ROUTE_CONFIDENCE: u8 = 80;
pub const DEFAULT_MAX_PRICE_AGE_SECS: u64 = 3_600;

/// Settlement fee in basis points (50 bps = 0.5%), deducted from the booking
/// payment at claim time. Cancellations are free.
pub const DEFAULT_PROTOCOL_FEE_BPS: u16 = 50;

// --- Stake & rewards --------------------------------------------------------

/// One whole unit of the 18-decimal native asset.
pub const NATIVE_UNIT: u128 = 1_000_000_000_000_000_000;

pub const DEFAULT_MIN_NODE_STAKE: u128 = NATIVE_UNIT;
pub const DEFAULT_MIN_SATELLITE_STAKE: u128 = NATIVE_UNIT;

/// Fixed relay reward paid from the reward pool on settlement (0.1 native).
pub const DEFAULT_RELAY_REWARD: u128 = NATIVE_UNIT / 10;

/// Share of node stake slashed for a completion that failed verification.
pub const DEFAULT_SLASH_BPS: u16 = 2_500;

/// Share of the slashed amount paid to the harmed satellite operator.
/// Remainder goes to the protocol treasury.
pub const DEFAULT_SLASH_REWARD_BPS: u16 = 5_000;

// --- Credit -----------------------------------------------------------------

pub const MAX_CREDIT_SCORE: u16 = 1_000;
pub const DEFAULT_CREDIT_INCREMENT: u16 = 10;

/// Scores below this are never BNPL-eligible.
pub const BNPL_SCORE_FLOOR: u16 = 650;

pub const DEFAULT_BNPL_LIMIT_PER_POINT: u128 = NATIVE_UNIT;

// --- Metadata ---------------------------------------------------------------

pub const MAX_METADATA_CID_LEN: usize = 128;
