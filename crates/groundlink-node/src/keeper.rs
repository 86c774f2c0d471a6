//! Background keeper.
//!
//! On every tick the keeper:
//!   1. commits time-gated pass transitions that are due (lock, dispute expiry);
//!   2. asks the attestation service about completed passes still waiting
//!      for a verdict, and submits the answers;
//!   3. refreshes token prices from the price feed.
//!
//! Collaborator calls happen outside the sequencer lock and are bounded by a
//! timeout. A failed call is logged and retried on the next tick; the ledger
//! only lists a pass as pending while its dispute window is open.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use groundlink_ledger::Call;
use groundlink_protocol::{Address, Amount, AttestationRequest, Timestamp, TokenId};

use crate::sequencer::{now_secs, Sequencer};

// ============================================================================
// Collaborators
// ============================================================================

#[async_trait]
pub trait Attestor: Send + Sync {
    /// Whether the relay described by `req` actually happened.
    async fn attest(&self, req: &AttestationRequest) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PriceObservation {
    /// USD, 8 decimals.
    pub price:      Amount,
    pub timestamp:  Timestamp,
    pub confidence: u8,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn price(&self, token: &TokenId) -> anyhow::Result<PriceObservation>;
}

#[derive(Deserialize)]
struct AttestResponse {
    valid: bool,
}

/// `POST {url}/attest` with the request as JSON, answering `{ "valid": bool }`.
pub struct HttpAttestor {
    client: reqwest::Client,
    url:    String,
}

impl HttpAttestor {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self { client, url: url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl Attestor for HttpAttestor {
    async fn attest(&self, req: &AttestationRequest) -> anyhow::Result<bool> {
        let url = format!("{}/attest", self.url);
        let resp = self.client.post(&url).json(req).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("attestation service returned HTTP {}", resp.status());
        }
        Ok(resp.json::<AttestResponse>().await?.valid)
    }
}

/// `GET {url}/price/{symbol}` answering a [`PriceObservation`].
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url:    String,
}

impl HttpPriceFeed {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self { client, url: url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn price(&self, token: &TokenId) -> anyhow::Result<PriceObservation> {
        let url = format!("{}/price/{token}", self.url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("price feed returned HTTP {} for {token}", resp.status());
        }
        Ok(resp.json().await?)
    }
}

// ============================================================================
// Keeper
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub synced:   usize,
    pub attested: usize,
    pub prices:   usize,
    pub failures: usize,
}

pub struct Keeper {
    seq:      Arc<Sequencer>,
    identity: Address,
    attestor: Option<Box<dyn Attestor>>,
    feed:     Option<Box<dyn PriceFeed>>,
    timeout:  Duration,
}

impl Keeper {
    pub fn new(seq: Arc<Sequencer>, identity: Address, timeout: Duration) -> Self {
        Self { seq, identity, attestor: None, feed: None, timeout }
    }

    pub fn with_attestor(mut self, attestor: impl Attestor + 'static) -> Self {
        self.attestor = Some(Box::new(attestor));
        self
    }

    pub fn with_price_feed(mut self, feed: impl PriceFeed + 'static) -> Self {
        self.feed = Some(Box::new(feed));
        self
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = self.tick(now_secs()).await;
            if report != TickReport::default() {
                tracing::info!(
                    synced = report.synced,
                    attested = report.attested,
                    prices = report.prices,
                    failures = report.failures,
                    "keeper tick"
                );
            }
        }
    }

    pub async fn tick(&self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        self.sync_due(now, &mut report).await;
        if let Some(attestor) = &self.attestor {
            self.attest_pending(attestor.as_ref(), now, &mut report).await;
        }
        if let Some(feed) = &self.feed {
            self.refresh_prices(feed.as_ref(), now, &mut report).await;
        }
        report
    }

    fn call(&self, now: Timestamp) -> Call {
        Call::new(self.identity, now)
    }

    async fn sync_due(&self, now: Timestamp, report: &mut TickReport) {
        let due = self.seq.read(|l| l.due_passes(now)).await;
        for pass_id in due {
            match self.seq.apply(|l| l.sync_pass(self.call(now), pass_id)).await {
                Ok(pass) => {
                    tracing::debug!(pass_id, state = %pass.state, "pass synced");
                    report.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(pass_id, "sync failed: {e}");
                    report.failures += 1;
                }
            }
        }
    }

    async fn attest_pending(&self, attestor: &dyn Attestor, now: Timestamp, report: &mut TickReport) {
        let pending = self.seq.read(|l| l.pending_attestations(now)).await;
        for req in pending {
            let pass_id = req.pass_id;
            let valid = match tokio::time::timeout(self.timeout, attestor.attest(&req)).await {
                Ok(Ok(valid)) => valid,
                Ok(Err(e)) => {
                    tracing::warn!(pass_id, "attestation request failed: {e}");
                    report.failures += 1;
                    continue;
                }
                Err(_) => {
                    tracing::warn!(pass_id, timeout = ?self.timeout, "attestation request timed out");
                    report.failures += 1;
                    continue;
                }
            };
            match self
                .seq
                .apply(|l| l.submit_attestation(self.call(now), pass_id, valid))
                .await
            {
                Ok(_) => report.attested += 1,
                Err(e) => {
                    tracing::warn!(pass_id, "attestation rejected by ledger: {e}");
                    report.failures += 1;
                }
            }
        }
    }

    async fn refresh_prices(&self, feed: &dyn PriceFeed, now: Timestamp, report: &mut TickReport) {
        // Tokens without a feed reference are priced by governance only.
        let tracked: Vec<TokenId> = self
            .seq
            .read(|l| {
                l.tokens()
                    .filter(|t| t.supported && !t.price_feed_ref.is_empty())
                    .map(|t| t.token.clone())
                    .collect()
            })
            .await;
        for token in tracked {
            let obs = match tokio::time::timeout(self.timeout, feed.price(&token)).await {
                Ok(Ok(obs)) => obs,
                Ok(Err(e)) => {
                    tracing::warn!(%token, "price fetch failed: {e}");
                    report.failures += 1;
                    continue;
                }
                Err(_) => {
                    tracing::warn!(%token, "price fetch timed out");
                    report.failures += 1;
                    continue;
                }
            };
            let result = self
                .seq
                .apply(|l| l.update_price(self.call(now), &token, obs.price, obs.timestamp, obs.confidence))
                .await;
            match result {
                Ok(()) => report.prices += 1,
                Err(e) => {
                    tracing::debug!(%token, "price update skipped: {e}");
                    report.failures += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundlink_ledger::{
        BookingRequest, Genesis, GenesisBalance, Ledger, NodeRegistration, RelayTelemetry,
        SatelliteRegistration, TokenSpec,
    };
    use groundlink_protocol::{CancelReason, PassId, PassState, NATIVE_UNIT};

    use crate::journal::Journal;

    const NOW: Timestamp = 1_800_000_000;
    const START: Timestamp = NOW + 7_200;
    const COMPLETED_AT: Timestamp = START + 7 * 60 + 60;
    const L1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const L2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    struct Fixed(bool);

    #[async_trait]
    impl Attestor for Fixed {
        async fn attest(&self, _req: &AttestationRequest) -> anyhow::Result<bool> {
            Ok(self.0)
        }
    }

    struct Slow;

    #[async_trait]
    impl Attestor for Slow {
        async fn attest(&self, _req: &AttestationRequest) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    struct FixedFeed {
        price: Amount,
    }

    #[async_trait]
    impl PriceFeed for FixedFeed {
        async fn price(&self, token: &TokenId) -> anyhow::Result<PriceObservation> {
            if token.as_str() != "USDC" {
                anyhow::bail!("unknown feed {token}");
            }
            Ok(PriceObservation { price: self.price, timestamp: COMPLETED_AT, confidence: 95 })
        }
    }

    fn keeper_address() -> Address {
        Address::from_label("keeper")
    }

    /// A ledger holding one completed pass, with the keeper registered as
    /// attestor and price feeder.
    fn completed_pass() -> (Arc<Sequencer>, PassId) {
        let gov = Address::from_label("governance");
        let node_owner = Address::from_label("node-owner");
        let sat_owner = Address::from_label("sat-owner");
        let validators: Vec<Address> =
            (0..3).map(|i| Address::from_label(&format!("validator-{i}"))).collect();
        let glnk = TokenId::new("GLNK");

        let mut genesis = Genesis::new(gov);
        genesis.timestamp = NOW;
        genesis.tokens = vec![
            TokenSpec {
                token:          glnk.clone(),
                decimals:       18,
                is_native:      true,
                price_feed_ref: String::new(),
                price:          100_000_000,
                min_confidence: 80,
            },
            TokenSpec {
                token:          TokenId::new("USDC"),
                decimals:       6,
                is_native:      false,
                price_feed_ref: "USDC/USD".into(),
                price:          100_000_000,
                min_confidence: 80,
            },
        ];
        genesis.balances = [node_owner, sat_owner]
            .into_iter()
            .map(|address| GenesisBalance { token: glnk.clone(), address, amount: 10 * NATIVE_UNIT })
            .collect();
        genesis.validators = validators.clone();
        genesis.attestors = vec![keeper_address()];
        genesis.price_feeders = vec![keeper_address()];

        let mut ledger = Ledger::from_genesis(genesis).unwrap();
        let node_id = ledger
            .register_node(
                Call::new(node_owner, NOW),
                NodeRegistration {
                    lat:          140_583,
                    lon:          777_093,
                    specs:        "S-band".into(),
                    uptime:       99,
                    stake:        NATIVE_UNIT,
                    metadata_cid: None,
                },
            )
            .unwrap();
        let satellite_id = ledger
            .register_satellite(
                Call::new(sat_owner, NOW),
                SatelliteRegistration { tle1: L1.into(), tle2: L2.into(), stake: NATIVE_UNIT, metadata_cid: None },
            )
            .unwrap();
        for v in &validators {
            ledger.submit_tle(Call::new(*v, NOW), satellite_id, L1, L2, NOW - 60, 90).unwrap();
        }
        let pass_id = ledger
            .book_pass(
                Call::new(sat_owner, NOW),
                BookingRequest {
                    node_id,
                    satellite_id,
                    start_time: START,
                    duration_minutes: 7,
                    token: glnk,
                    amount: NATIVE_UNIT,
                },
            )
            .unwrap();
        ledger.confirm_pass(Call::new(node_owner, NOW + 60), pass_id).unwrap();
        ledger
            .complete_pass(
                Call::new(node_owner, COMPLETED_AT),
                pass_id,
                [1u8; 32],
                RelayTelemetry { relay_timestamp: START + 60, bytes_relayed: 4096 },
            )
            .unwrap();
        (Arc::new(Sequencer::new(ledger, Journal::in_memory())), pass_id)
    }

    #[tokio::test]
    async fn positive_verdict_verifies_the_pass() {
        let (seq, pass_id) = completed_pass();
        let keeper = Keeper::new(seq.clone(), keeper_address(), Duration::from_secs(1)).with_attestor(Fixed(true));

        let report = keeper.tick(COMPLETED_AT + 30).await;
        assert_eq!(report.attested, 1);
        assert_eq!(report.failures, 0);
        let state = seq.read(|l| l.pass(pass_id).map(|p| p.state)).await;
        assert_eq!(state, Ok(PassState::Verified));

        // Nothing left to do.
        assert_eq!(keeper.tick(COMPLETED_AT + 60).await, TickReport::default());
    }

    #[tokio::test]
    async fn slow_attestor_times_out_and_leaves_the_pass_pending() {
        let (seq, pass_id) = completed_pass();
        let keeper = Keeper::new(seq.clone(), keeper_address(), Duration::from_millis(50)).with_attestor(Slow);

        let report = keeper.tick(COMPLETED_AT + 30).await;
        assert_eq!(report.attested, 0);
        assert_eq!(report.failures, 1);
        let pending = seq.read(|l| l.pending_attestations(COMPLETED_AT + 30)).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pass_id, pass_id);
    }

    #[tokio::test]
    async fn expired_pass_is_synced_and_refunded() {
        let (seq, pass_id) = completed_pass();
        let keeper = Keeper::new(seq.clone(), keeper_address(), Duration::from_secs(1));

        let expiry = COMPLETED_AT + 86_400 + 1;
        let report = keeper.tick(expiry).await;
        assert_eq!(report.synced, 1);
        let reason = seq.read(|l| l.pass(pass_id).map(|p| p.cancel_reason)).await;
        assert_eq!(reason, Ok(Some(CancelReason::AttestationTimeout)));
    }

    #[tokio::test]
    async fn prices_are_refreshed_through_the_feeder_path() {
        let (seq, _) = completed_pass();
        let keeper = Keeper::new(seq.clone(), keeper_address(), Duration::from_secs(1))
            .with_price_feed(FixedFeed { price: 99_980_000 });

        let report = keeper.tick(COMPLETED_AT).await;
        assert_eq!(report.prices, 1);
        let usdc = seq.read(|l| l.token(&TokenId::new("USDC")).cloned()).await.unwrap();
        assert_eq!(usdc.cached_price, 99_980_000);
        assert_eq!(usdc.oracle_confidence, 95);
        assert!(!usdc.emergency);

        // Same observation again is not newer than the cached one.
        let report = keeper.tick(COMPLETED_AT + 30).await;
        assert_eq!(report.prices, 0);
        assert_eq!(report.failures, 1);
    }
}
