use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use groundlink_ledger::Genesis;
use groundlink_protocol::{Address, Timestamp};

#[derive(Parser, Debug)]
#[command(name = "groundlink-node", about = "GroundLink relay marketplace sequencer")]
pub struct Config {
    /// HTTP listen address.
    #[arg(long, env = "GROUNDLINK_LISTEN", default_value = "0.0.0.0:8090")]
    pub listen: SocketAddr,

    /// Genesis file (JSON): governance, protocol params, tokens, balances and
    /// initial validators / attestors / price feeders.
    /// If absent, the ledger starts empty with default params and
    /// `--governance` as the only privileged account.
    #[arg(long, env = "GROUNDLINK_GENESIS")]
    pub genesis: Option<PathBuf>,

    /// Governance address (hex, 32 bytes). Used only without `--genesis`.
    #[arg(long, env = "GROUNDLINK_GOVERNANCE")]
    pub governance: Option<Address>,

    /// Bearer token required on mutating routes.
    /// If absent, mutating routes are unauthenticated (dev only).
    #[arg(long, env = "GROUNDLINK_API_SECRET")]
    pub api_secret: Option<String>,

    /// Directory for the CBOR event journal.
    /// If absent, events are hashed but not written to disk.
    #[arg(long, env = "GROUNDLINK_JOURNAL_DIR")]
    pub journal_dir: Option<PathBuf>,

    /// Attestation service base URL (`POST {url}/attest`).
    #[arg(long, env = "GROUNDLINK_ATTESTATION_URL")]
    pub attestation_url: Option<String>,

    /// Upper bound on a single attestation request.
    #[arg(long, env = "GROUNDLINK_ATTESTATION_TIMEOUT_SECS", default_value_t = 10)]
    pub attestation_timeout_secs: u64,

    /// Price-feed base URL (`GET {url}/price/{symbol}`).
    #[arg(long, env = "GROUNDLINK_PRICE_FEED_URL")]
    pub price_feed_url: Option<String>,

    /// Seconds between keeper ticks.
    #[arg(long, env = "GROUNDLINK_KEEPER_INTERVAL_SECS", default_value_t = 30)]
    pub keeper_interval_secs: u64,

    /// Address the keeper acts as. Must be a registered attestor and/or price
    /// feeder for its submissions to be accepted.
    #[arg(long, env = "GROUNDLINK_KEEPER_ADDRESS")]
    pub keeper_address: Option<Address>,
}

impl Config {
    /// Genesis from `--genesis`, or a minimal one owned by `--governance`.
    pub fn load_genesis(&self, now: Timestamp) -> anyhow::Result<Genesis> {
        let mut genesis = match (&self.genesis, self.governance) {
            (Some(path), _) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("cannot read genesis {}: {e}", path.display()))?;
                Genesis::from_json(&json)
                    .map_err(|e| anyhow::anyhow!("invalid genesis {}: {e}", path.display()))?
            }
            (None, Some(governance)) => Genesis::new(governance),
            (None, None) => anyhow::bail!("either --genesis or --governance is required"),
        };
        if genesis.timestamp == 0 {
            genesis.timestamp = now;
        }
        Ok(genesis)
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_secs(self.attestation_timeout_secs)
    }

    pub fn keeper_interval(&self) -> Duration {
        Duration::from_secs(self.keeper_interval_secs.max(1))
    }
}
