pub mod constants;
pub mod error;
pub mod events;
pub mod hash;
pub mod types;
pub mod validation;

pub use constants::*;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use events::{EventRecord, LedgerEvent};
pub use types::{
    Address, Amount, AttestationRequest, CancelReason, DisputeReason, NodeId, PassId, PassState,
    SatelliteId, Timestamp, TokenId,
};
