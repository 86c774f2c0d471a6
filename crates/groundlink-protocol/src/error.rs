use thiserror::Error;

use crate::types::{Address, Amount, NodeId, PassId, PassState, SatelliteId, Timestamp, TokenId};

/// Coarse error class, used by callers to decide how to react
/// (e.g. the HTTP layer maps each class to a status code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; nothing was applied.
    Validation,
    /// Caller lacks the role the operation requires.
    Authorization,
    /// Referenced entity does not exist.
    NotFound,
    /// Operation not allowed in the entity's current state or time window.
    State,
    /// Value could not move: prices, balances, stake, slippage.
    Economic,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // --- Validation -----------------------------------------------------------
    #[error("coordinates out of range: lat {lat}, lon {lon} (scaled ×10000)")]
    InvalidCoordinates { lat: i32, lon: i32 },

    #[error("pass duration {0} min outside 5..=10")]
    InvalidDuration(u32),

    #[error("invalid TLE data: {0}")]
    InvalidTleData(String),

    #[error("confidence {0} exceeds 100")]
    InvalidConfidence(u8),

    #[error("uptime {0}% exceeds 100")]
    InvalidUptime(u8),

    #[error("invalid metadata CID: {0}")]
    InvalidMetadataCid(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("{0} is a reserved protocol account and cannot act as a caller")]
    ReservedCaller(Address),

    // --- Authorization --------------------------------------------------------
    #[error("caller is not an active validator")]
    NotValidator,

    #[error("caller is not governance")]
    NotGovernance,

    #[error("caller does not own this record")]
    NotOwner,

    #[error("caller is not a counterparty of pass {0}")]
    NotCounterparty(PassId),

    #[error("caller is not on the authorized-caller list")]
    NotAuthorizedCaller,

    #[error("caller is not a registered attestor")]
    NotAttestor,

    #[error("caller is not a registered price feeder")]
    NotPriceFeeder,

    // --- Not found ------------------------------------------------------------
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("satellite {0} not found")]
    SatelliteNotFound(SatelliteId),

    #[error("pass {0} not found")]
    PassNotFound(PassId),

    #[error("no validated TLE for satellite {0}")]
    NoValidTle(SatelliteId),

    // --- State ----------------------------------------------------------------
    #[error("pass {pass_id} is {current}, expected {expected}")]
    InvalidState {
        pass_id:  PassId,
        current:  PassState,
        expected: PassState,
    },

    #[error("pass {0} already settled")]
    AlreadySettled(PassId),

    #[error("pass {0} already cancelled")]
    AlreadyCancelled(PassId),

    #[error("pass {pass_id} is past its lock boundary at {lock_boundary}")]
    LockWindowReached { pass_id: PassId, lock_boundary: Timestamp },

    #[error("confirmation deadline {deadline} passed for pass {pass_id}")]
    DeadlinePassed { pass_id: PassId, deadline: Timestamp },

    #[error("too early: allowed from {allowed_at}, now {now}")]
    TooEarly { allowed_at: Timestamp, now: Timestamp },

    #[error("pass start {start_time} leaves no time before the lock boundary")]
    StartTooSoon { start_time: Timestamp },

    #[error("dispute window for pass {0} has closed")]
    DisputeWindowClosed(PassId),

    #[error("node {0} is inactive")]
    NodeInactive(NodeId),

    #[error("satellite {0} is inactive")]
    SatelliteInactive(SatelliteId),

    #[error("node {node_id} already holds pass {conflicting} in that window")]
    NodeBusy { node_id: NodeId, conflicting: PassId },

    #[error("{0} still has open passes")]
    OpenPasses(String),

    #[error("{0} is still active")]
    StillActive(String),

    #[error("address is already an active validator")]
    AlreadyValidator,

    #[error("observation at {observed_at} is older than the current submission at {current}")]
    StaleObservation { observed_at: Timestamp, current: Timestamp },

    // --- Economic -------------------------------------------------------------
    #[error("token {0} is not supported")]
    UnsupportedToken(TokenId),

    #[error("token {0} is already registered")]
    TokenAlreadyRegistered(TokenId),

    #[error("a native asset is already registered")]
    NativeAlreadyRegistered,

    #[error("price confidence {got} below required {required}")]
    InsufficientConfidence { got: u8, required: u8 },

    #[error("no usable price for {0}")]
    PriceUnavailable(TokenId),

    #[error("price for {token} is stale (updated at {updated_at})")]
    StalePrice { token: TokenId, updated_at: Timestamp },

    #[error("slippage exceeded: expected {expected}, realized {realized}, tolerance {tolerance_bps} bps")]
    SlippageExceeded {
        expected:      Amount,
        realized:      Amount,
        tolerance_bps: u16,
    },

    #[error("insufficient stake: provided {provided}, required {required}")]
    InsufficientStake { provided: Amount, required: Amount },

    #[error("insufficient {token} balance: have {have}, need {need}")]
    InsufficientBalance {
        token: TokenId,
        have:  Amount,
        need:  Amount,
    },

    #[error("arithmetic overflow")]
    Overflow,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            InvalidCoordinates { .. }
            | InvalidDuration(_)
            | InvalidTleData(_)
            | InvalidConfidence(_)
            | InvalidUptime(_)
            | InvalidMetadataCid(_)
            | InvalidParameter(_)
            | ZeroAmount
            | ReservedCaller(_) => ErrorKind::Validation,

            NotValidator
            | NotGovernance
            | NotOwner
            | NotCounterparty(_)
            | NotAuthorizedCaller
            | NotAttestor
            | NotPriceFeeder => ErrorKind::Authorization,

            NodeNotFound(_) | SatelliteNotFound(_) | PassNotFound(_) | NoValidTle(_) => {
                ErrorKind::NotFound
            }

            InvalidState { .. }
            | AlreadySettled(_)
            | AlreadyCancelled(_)
            | LockWindowReached { .. }
            | DeadlinePassed { .. }
            | TooEarly { .. }
            | StartTooSoon { .. }
            | DisputeWindowClosed(_)
            | NodeInactive(_)
            | SatelliteInactive(_)
            | NodeBusy { .. }
            | OpenPasses(_)
            | StillActive(_)
            | AlreadyValidator
            | StaleObservation { .. } => ErrorKind::State,

            UnsupportedToken(_)
            | TokenAlreadyRegistered(_)
            | NativeAlreadyRegistered
            | InsufficientConfidence { .. }
            | PriceUnavailable(_)
            | StalePrice { .. }
            | SlippageExceeded { .. }
            | InsufficientStake { .. }
            | InsufficientBalance { .. }
            | Overflow => ErrorKind::Economic,
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
