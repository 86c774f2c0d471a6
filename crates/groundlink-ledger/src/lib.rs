//! GroundLink ledger: TLE oracle consensus, multi-asset payment routing and
//! the relay-pass marketplace, behind one transactional [`Ledger`].

pub mod auth;
pub mod config;
pub mod credit;
pub mod events;
pub mod ledger;
mod lifecycle;
pub mod marketplace;
pub mod oracle;
mod registry;
pub mod router;
pub mod settlement;

pub use config::{Genesis, GenesisBalance, ProtocolParams, TokenSpec};
pub use credit::BnplEligibility;
pub use ledger::{Call, Ledger, LedgerState};
pub use marketplace::{
    BookingRequest, Node, NodeRegistration, Pass, RelayTelemetry, Satellite, SatelliteRegistration,
};
pub use oracle::{ConsensusResult, Validator};
pub use router::{NewToken, PaymentReceipt, SwapQuote, TokenInfo};
pub use settlement::RewardReceipt;
