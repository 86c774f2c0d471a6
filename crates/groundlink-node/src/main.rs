mod api;
mod config;
mod journal;
mod keeper;
mod sequencer;

use std::sync::Arc;

use clap::Parser;

use groundlink_ledger::Ledger;

use crate::{
    api::AppState,
    config::Config,
    journal::Journal,
    keeper::{HttpAttestor, HttpPriceFeed, Keeper},
    sequencer::{now_secs, Sequencer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("groundlink_node=info,groundlink_ledger=info")),
        )
        .init();

    let config = Config::parse();
    let now = now_secs();

    let genesis = config.load_genesis(now)?;
    let ledger = Ledger::from_genesis(genesis).map_err(|e| anyhow::anyhow!("genesis rejected: {e}"))?;
    tracing::info!(governance = %ledger.governance(), events = ledger.last_seq(), "ledger ready");

    let journal = match &config.journal_dir {
        Some(dir) => {
            let journal = Journal::open(dir, now)?;
            if let Some(path) = journal.path() {
                tracing::info!("journaling events to {}", path.display());
            }
            journal
        }
        None => {
            tracing::warn!("no --journal-dir set: events are hashed but not persisted");
            Journal::in_memory()
        }
    };

    let seq = Arc::new(Sequencer::new(ledger, journal));

    if config.api_secret.is_none() {
        tracing::warn!("no --api-secret set: mutating routes are unauthenticated");
    }

    let wants_keeper = config.attestation_url.is_some() || config.price_feed_url.is_some();
    match (wants_keeper, config.keeper_address) {
        (true, Some(identity)) => {
            let client = reqwest::Client::new();
            let mut keeper = Keeper::new(Arc::clone(&seq), identity, config.attestation_timeout());
            if let Some(url) = &config.attestation_url {
                keeper = keeper.with_attestor(HttpAttestor::new(client.clone(), url));
            }
            if let Some(url) = &config.price_feed_url {
                keeper = keeper.with_price_feed(HttpPriceFeed::new(client.clone(), url));
            }
            tracing::info!(%identity, interval_secs = config.keeper_interval().as_secs(), "keeper started");
            tokio::spawn(keeper.run(config.keeper_interval()));
        }
        (true, None) => {
            tracing::warn!("collaborator URLs configured without --keeper-address: keeper disabled");
        }
        (false, _) => {}
    }

    api::serve(
        AppState { seq, api_secret: config.api_secret.clone() },
        config.listen,
    )
    .await
}
