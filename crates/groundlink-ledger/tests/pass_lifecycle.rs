use groundlink_ledger::{
    BookingRequest, Call, Genesis, GenesisBalance, Ledger, NodeRegistration, RelayTelemetry,
    SatelliteRegistration, TokenSpec,
};
use groundlink_protocol::{
    Address, Amount, CancelReason, DisputeReason, LedgerError, LedgerEvent, NodeId, PassId,
    PassState, SatelliteId, Timestamp, TokenId, NATIVE_UNIT,
};

const NOW: Timestamp = 1_800_000_000;
const USD: Amount = 100_000_000;
const USDC_UNIT: Amount = 1_000_000;

const ISS_L1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
const ISS_L2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

/// Bookings start two hours out; the lock boundary is one hour before start.
const START: Timestamp = NOW + 7_200;
const PASS_END: Timestamp = START + 7 * 60;
const DISPUTE_WINDOW: u64 = 86_400;

fn glnk() -> TokenId {
    TokenId::new("GLNK")
}

fn usdc() -> TokenId {
    TokenId::new("USDC")
}

struct Actors {
    governance: Address,
    node_owner: Address,
    sat_owner:  Address,
    attestor:   Address,
    feeder:     Address,
    validators: [Address; 3],
}

impl Actors {
    fn new() -> Self {
        Self {
            governance: Address::from_label("governance"),
            node_owner: Address::from_label("ground-station-operator"),
            sat_owner:  Address::from_label("satellite-operator"),
            attestor:   Address::from_label("attestor"),
            feeder:     Address::from_label("price-feeder"),
            validators: [
                Address::from_label("validator-1"),
                Address::from_label("validator-2"),
                Address::from_label("validator-3"),
            ],
        }
    }
}

struct Fixture {
    ledger:       Ledger,
    who:          Actors,
    node_id:      NodeId,
    satellite_id: SatelliteId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_reward_pool(100 * NATIVE_UNIT)
    }

    fn with_reward_pool(reward_pool: Amount) -> Self {
        let who = Actors::new();
        let mut genesis = Genesis::new(who.governance);
        genesis.timestamp = NOW;
        genesis.tokens = vec![
            TokenSpec {
                token:          glnk(),
                decimals:       18,
                is_native:      true,
                price_feed_ref: "GLNK/USD".into(),
                price:          USD,
                min_confidence: 80,
            },
            TokenSpec {
                token:          usdc(),
                decimals:       6,
                is_native:      false,
                price_feed_ref: "USDC/USD".into(),
                price:          USD,
                min_confidence: 80,
            },
        ];
        let mut balances = vec![
            (glnk(), Address::ROUTER_RESERVE, 1_000 * NATIVE_UNIT),
            (usdc(), Address::ROUTER_RESERVE, 1_000 * USDC_UNIT),
            (glnk(), who.node_owner, 10 * NATIVE_UNIT),
            (glnk(), who.sat_owner, 10 * NATIVE_UNIT),
            (usdc(), who.sat_owner, 1_000 * USDC_UNIT),
        ];
        if reward_pool > 0 {
            balances.push((glnk(), Address::REWARD_POOL, reward_pool));
        }
        genesis.balances = balances
            .into_iter()
            .map(|(token, address, amount)| GenesisBalance { token, address, amount })
            .collect();
        genesis.validators = who.validators.to_vec();
        genesis.attestors = vec![who.attestor];
        genesis.price_feeders = vec![who.feeder];

        let mut ledger = Ledger::from_genesis(genesis).unwrap();
        let node_id = ledger
            .register_node(
                Call::new(who.node_owner, NOW),
                NodeRegistration {
                    lat:          140_583,
                    lon:          777_093,
                    specs:        "S-band 2.4m dish".into(),
                    uptime:       99,
                    stake:        NATIVE_UNIT,
                    metadata_cid: Some("QmGroundStationSpecs".into()),
                },
            )
            .unwrap();
        let satellite_id = ledger
            .register_satellite(
                Call::new(who.sat_owner, NOW),
                SatelliteRegistration {
                    tle1:         ISS_L1.into(),
                    tle2:         ISS_L2.into(),
                    stake:        NATIVE_UNIT,
                    metadata_cid: None,
                },
            )
            .unwrap();
        Self { ledger, who, node_id, satellite_id }
    }

    fn reach_consensus(&mut self) {
        for (validator, confidence) in self.who.validators.iter().zip([85, 90, 88]) {
            self.ledger
                .submit_tle(Call::new(*validator, NOW), self.satellite_id, ISS_L1, ISS_L2, NOW - 60, confidence)
                .unwrap();
        }
    }

    fn booking(&self, token: TokenId, amount: Amount) -> BookingRequest {
        BookingRequest {
            node_id: self.node_id,
            satellite_id: self.satellite_id,
            start_time: START,
            duration_minutes: 7,
            token,
            amount,
        }
    }

    fn book(&mut self, token: TokenId, amount: Amount) -> PassId {
        let req = self.booking(token, amount);
        self.ledger.book_pass(Call::new(self.who.sat_owner, NOW), req).unwrap()
    }

    /// Book, confirm and complete a pass in GLNK.
    fn completed_pass(&mut self) -> PassId {
        let id = self.book(glnk(), 2 * NATIVE_UNIT);
        self.complete(id);
        id
    }

    fn complete(&mut self, id: PassId) {
        self.ledger.confirm_pass(Call::new(self.who.node_owner, NOW + 60), id).unwrap();
        self.ledger
            .complete_pass(
                Call::new(self.who.node_owner, PASS_END + 60),
                id,
                [7u8; 32],
                RelayTelemetry { relay_timestamp: START + 120, bytes_relayed: 1 << 20 },
            )
            .unwrap();
    }

    fn attest(&mut self, id: PassId, valid: bool) -> PassState {
        self.ledger
            .submit_attestation(Call::new(self.who.attestor, PASS_END + 120), id, valid)
            .unwrap()
    }

    fn balance(&self, token: &TokenId, who: Address) -> Amount {
        self.ledger.balance_of(token, &who)
    }
}

#[test]
fn verified_pass_settles_once() {
    let mut f = Fixture::new();

    let first = f
        .ledger
        .submit_tle(Call::new(f.who.validators[0], NOW), f.satellite_id, ISS_L1, ISS_L2, NOW - 60, 85)
        .unwrap();
    assert!(first.is_none());
    f.reach_consensus();
    let consensus = f.ledger.validated_tle(f.satellite_id).unwrap();
    assert_eq!(consensus.validator_count, 3);
    assert_eq!(consensus.confidence, 90);

    let mut too_long = f.booking(glnk(), 2 * NATIVE_UNIT);
    too_long.duration_minutes = 15;
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.sat_owner, NOW), too_long),
        Err(LedgerError::InvalidDuration(15))
    );

    let id = f.book(glnk(), 2 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), Address::ESCROW), 2 * NATIVE_UNIT);
    f.complete(id);
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Completed);

    let pending = f.ledger.pending_attestations(PASS_END + 100);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].pass_id, id);
    assert_eq!(pending[0].expected_start_time, START);

    assert_eq!(f.attest(id, true), PassState::Verified);
    assert!(f.ledger.pending_attestations(PASS_END + 200).is_empty());
    assert_eq!(f.ledger.node(f.node_id).unwrap().total_relays, 1);

    let receipt = f
        .ledger
        .claim_reward(Call::new(f.who.node_owner, PASS_END + 300), id, None)
        .unwrap();
    let fee = 2 * NATIVE_UNIT / 200;
    assert_eq!(receipt.fee, fee);
    assert_eq!(receipt.payout, 2 * NATIVE_UNIT - fee);
    assert_eq!(receipt.reward, NATIVE_UNIT / 10);
    assert_eq!(receipt.credit_score, 10);
    assert_eq!(f.ledger.credit_score(&f.who.node_owner), 10);

    assert_eq!(f.balance(&glnk(), Address::ESCROW), 0);
    assert_eq!(f.balance(&glnk(), Address::TREASURY), fee);
    // 10 funded, 1 staked, then payout and relay reward.
    assert_eq!(
        f.balance(&glnk(), f.who.node_owner),
        9 * NATIVE_UNIT + (2 * NATIVE_UNIT - fee) + NATIVE_UNIT / 10
    );

    assert_eq!(
        f.ledger.claim_reward(Call::new(f.who.node_owner, PASS_END + 400), id, None),
        Err(LedgerError::AlreadySettled(id))
    );
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Settled);
}

#[test]
fn counterparty_cancel_refunds_in_full() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), 2 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 7 * NATIVE_UNIT);

    let stranger = Address::from_label("stranger");
    assert_eq!(
        f.ledger.cancel_pass(Call::new(stranger, NOW + 10), id),
        Err(LedgerError::NotCounterparty(id))
    );

    let refund = f.ledger.cancel_pass(Call::new(f.who.sat_owner, NOW + 10), id).unwrap();
    assert_eq!(refund, 2 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 9 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), Address::ESCROW), 0);

    let pass = f.ledger.pass(id).unwrap();
    assert_eq!(pass.state, PassState::Cancelled);
    assert_eq!(pass.cancel_reason, Some(CancelReason::Counterparty { by: f.who.sat_owner }));

    assert_eq!(
        f.ledger.cancel_pass(Call::new(f.who.sat_owner, NOW + 20), id),
        Err(LedgerError::AlreadyCancelled(id))
    );
}

#[test]
fn node_owner_may_cancel_a_confirmed_pass() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), NATIVE_UNIT);
    f.ledger.confirm_pass(Call::new(f.who.node_owner, NOW + 60), id).unwrap();
    f.ledger.cancel_pass(Call::new(f.who.node_owner, NOW + 120), id).unwrap();
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 8 * NATIVE_UNIT + NATIVE_UNIT);
    // The slot is free again.
    f.book(glnk(), NATIVE_UNIT);
}

#[test]
fn confirmed_pass_locks_at_the_boundary() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), NATIVE_UNIT);
    f.ledger.confirm_pass(Call::new(f.who.node_owner, NOW + 60), id).unwrap();

    let boundary = START - 3_600;
    assert_eq!(f.ledger.pass_state(id, boundary - 1).unwrap(), PassState::Confirmed);
    assert_eq!(f.ledger.pass_state(id, boundary).unwrap(), PassState::Locked);
    assert_eq!(f.ledger.due_passes(boundary), vec![id]);

    assert_eq!(
        f.ledger.cancel_pass(Call::new(f.who.sat_owner, boundary), id),
        Err(LedgerError::LockWindowReached { pass_id: id, lock_boundary: boundary })
    );
    // The rejected call committed nothing; syncing takes the transition.
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Confirmed);
    let pass = f.ledger.sync_pass(Call::new(f.who.attestor, boundary), id).unwrap();
    assert_eq!(pass.state, PassState::Locked);
    assert_eq!(pass.locked_at, Some(boundary));
    assert!(f.ledger.due_passes(boundary).is_empty());
}

#[test]
fn overlapping_booking_is_rejected() {
    let mut f = Fixture::new();
    let first = f.book(glnk(), NATIVE_UNIT);
    let mut overlapping = f.booking(glnk(), NATIVE_UNIT);
    overlapping.start_time = START + 300;
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.sat_owner, NOW), overlapping),
        Err(LedgerError::NodeBusy { node_id: f.node_id, conflicting: first })
    );
}

#[test]
fn booking_inside_the_lock_window_is_rejected() {
    let mut f = Fixture::new();
    let mut late = f.booking(glnk(), NATIVE_UNIT);
    late.start_time = NOW + 3_600;
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.sat_owner, NOW), late),
        Err(LedgerError::StartTooSoon { start_time: NOW + 3_600 })
    );
}

#[test]
fn rejected_attestation_then_expiry_slashes_the_node() {
    let mut f = Fixture::new();
    f.reach_consensus();
    let id = f.completed_pass();

    assert_eq!(f.attest(id, false), PassState::Completed);
    let pass = f.ledger.pass(id).unwrap();
    assert_eq!(pass.dispute.map(|d| d.reason), Some(DisputeReason::AttestationRejected));
    assert!(f.ledger.pending_attestations(PASS_END + 200).is_empty());

    assert_eq!(
        f.ledger.claim_reward(Call::new(f.who.node_owner, PASS_END + 300), id, None),
        Err(LedgerError::InvalidState {
            pass_id:  id,
            current:  PassState::Completed,
            expected: PassState::Verified,
        })
    );

    let completed_at = PASS_END + 60;
    let expiry = completed_at + DISPUTE_WINDOW + 1;
    assert_eq!(f.ledger.pass_state(id, expiry - 1).unwrap(), PassState::Completed);
    let pass = f.ledger.sync_pass(Call::new(f.who.sat_owner, expiry), id).unwrap();
    assert_eq!(pass.state, PassState::Cancelled);
    assert_eq!(pass.cancel_reason, Some(CancelReason::VerificationFailed));

    let slashed = NATIVE_UNIT / 4;
    let node = f.ledger.node(f.node_id).unwrap();
    assert_eq!(node.stake_amount, NATIVE_UNIT - slashed);
    assert!(!node.active);
    // Refund plus half the slash.
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 9 * NATIVE_UNIT + slashed / 2);
    assert_eq!(f.balance(&glnk(), Address::TREASURY), slashed / 2);

    let slash_events = f
        .ledger
        .events_since(0)
        .iter()
        .filter(|r| matches!(r.event, LedgerEvent::StakeSlashed { .. }))
        .count();
    assert_eq!(slash_events, 1);

    assert_eq!(
        f.ledger.claim_reward(Call::new(f.who.node_owner, expiry), id, None),
        Err(LedgerError::AlreadyCancelled(id))
    );
}

#[test]
fn late_positive_attestation_clears_a_dispute() {
    let mut f = Fixture::new();
    f.reach_consensus();
    let id = f.completed_pass();
    f.attest(id, false);
    assert_eq!(f.attest(id, true), PassState::Verified);
    assert!(f.ledger.pass(id).unwrap().dispute.is_none());
}

#[test]
fn attestation_after_the_window_is_refused() {
    let mut f = Fixture::new();
    f.reach_consensus();
    let id = f.completed_pass();
    let late = PASS_END + 60 + DISPUTE_WINDOW + 1;
    assert_eq!(
        f.ledger.submit_attestation(Call::new(f.who.attestor, late), id, true),
        Err(LedgerError::DisputeWindowClosed(id))
    );
}

#[test]
fn missing_attestation_times_out_without_slashing() {
    let mut f = Fixture::new();
    let id = f.completed_pass();
    let expiry = PASS_END + 60 + DISPUTE_WINDOW + 1;
    assert_eq!(f.ledger.due_passes(expiry), vec![id]);

    let pass = f.ledger.sync_pass(Call::new(f.who.node_owner, expiry), id).unwrap();
    assert_eq!(pass.cancel_reason, Some(CancelReason::AttestationTimeout));
    let node = f.ledger.node(f.node_id).unwrap();
    assert_eq!(node.stake_amount, NATIVE_UNIT);
    assert!(node.active);
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 9 * NATIVE_UNIT);
}

#[test]
fn attestation_without_consensus_disputes_as_stale_tle() {
    let mut f = Fixture::new();
    let id = f.completed_pass();
    assert_eq!(f.attest(id, true), PassState::Completed);
    let pass = f.ledger.pass(id).unwrap();
    assert_eq!(pass.dispute.map(|d| d.reason), Some(DisputeReason::StaleTle));
}

#[test]
fn usdc_booking_settles_in_glnk() {
    let mut f = Fixture::new();
    f.reach_consensus();
    let id = f.book(usdc(), 100 * USDC_UNIT);
    let quoted = f.ledger.pass(id).unwrap().quoted_settlement;
    // 99.5 USDC after the fee, at parity.
    assert_eq!(quoted, 995 * NATIVE_UNIT / 10);
    assert_eq!(f.balance(&usdc(), f.who.sat_owner), 900 * USDC_UNIT);

    f.complete(id);
    f.attest(id, true);

    // The feeder refreshes USDC before settlement.
    let claim_at = PASS_END + 300;
    f.ledger
        .update_price(Call::new(f.who.feeder, claim_at), &usdc(), USD, claim_at, 95)
        .unwrap();
    assert!(matches!(
        f.ledger.claim_reward(Call::new(f.who.node_owner, claim_at), id, Some(quoted * 2)),
        Err(LedgerError::SlippageExceeded { .. })
    ));
    let receipt = f
        .ledger
        .claim_reward(Call::new(f.who.node_owner, claim_at), id, Some(quoted))
        .unwrap();
    assert_eq!(receipt.payout_token, glnk());
    assert_eq!(receipt.payout, quoted);
    assert_eq!(receipt.fee, USDC_UNIT / 2);

    assert_eq!(f.balance(&usdc(), Address::TREASURY), USDC_UNIT / 2);
    assert_eq!(f.balance(&usdc(), Address::ROUTER_RESERVE), 1_000 * USDC_UNIT + 995 * USDC_UNIT / 10);
    assert_eq!(
        f.balance(&glnk(), f.who.node_owner),
        9 * NATIVE_UNIT + quoted + NATIVE_UNIT / 10
    );
}

#[test]
fn underfunded_reward_pool_fails_the_claim_atomically() {
    let mut f = Fixture::with_reward_pool(0);
    f.reach_consensus();
    let id = f.completed_pass();
    f.attest(id, true);
    let seq = f.ledger.last_seq();

    assert!(matches!(
        f.ledger.claim_reward(Call::new(f.who.node_owner, PASS_END + 300), id, None),
        Err(LedgerError::InsufficientBalance { .. })
    ));
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Verified);
    assert_eq!(f.balance(&glnk(), Address::ESCROW), 2 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), Address::TREASURY), 0);
    assert_eq!(f.ledger.last_seq(), seq);
}

#[test]
fn stake_returns_only_after_deactivation_with_no_open_passes() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), NATIVE_UNIT);
    let owner = Call::new(f.who.node_owner, NOW + 10);

    assert!(matches!(f.ledger.withdraw_node_stake(owner, f.node_id), Err(LedgerError::StillActive(_))));
    f.ledger.deactivate_node(owner, f.node_id).unwrap();
    assert!(matches!(f.ledger.withdraw_node_stake(owner, f.node_id), Err(LedgerError::OpenPasses(_))));

    f.ledger.cancel_pass(Call::new(f.who.sat_owner, NOW + 20), id).unwrap();
    assert_eq!(f.ledger.withdraw_node_stake(owner, f.node_id), Ok(NATIVE_UNIT));
    assert_eq!(f.balance(&glnk(), f.who.node_owner), 10 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), Address::STAKE_VAULT), NATIVE_UNIT);
}

#[test]
fn stale_tle_dispute_expires_without_slashing() {
    let mut f = Fixture::new();
    let id = f.completed_pass();
    assert_eq!(f.attest(id, true), PassState::Completed);

    // A positive verdict that could not be checked stays queued.
    let pending = f.ledger.pending_attestations(PASS_END + 200);
    assert_eq!(pending.iter().map(|r| r.pass_id).collect::<Vec<_>>(), vec![id]);

    let expiry = PASS_END + 60 + DISPUTE_WINDOW + 1;
    let pass = f.ledger.sync_pass(Call::new(f.who.sat_owner, expiry), id).unwrap();
    assert_eq!(pass.cancel_reason, Some(CancelReason::TleUnavailable));

    let node = f.ledger.node(f.node_id).unwrap();
    assert_eq!(node.stake_amount, NATIVE_UNIT);
    assert!(node.active);
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 9 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), Address::TREASURY), 0);
    assert!(!f
        .ledger
        .events_since(0)
        .iter()
        .any(|r| matches!(r.event, LedgerEvent::StakeSlashed { .. })));
}

#[test]
fn stale_tle_dispute_verifies_once_consensus_is_fresh() {
    let mut f = Fixture::new();
    let id = f.completed_pass();
    assert_eq!(f.attest(id, true), PassState::Completed);

    f.reach_consensus();
    assert_eq!(f.attest(id, true), PassState::Verified);
    let pass = f.ledger.pass(id).unwrap();
    assert!(pass.dispute.is_none());
    assert!(f.ledger.pending_attestations(PASS_END + 200).is_empty());
}

#[test]
fn rejection_after_stale_tle_still_slashes() {
    let mut f = Fixture::new();
    let id = f.completed_pass();
    assert_eq!(f.attest(id, true), PassState::Completed);
    f.reach_consensus();
    assert_eq!(f.attest(id, false), PassState::Completed);
    let pass = f.ledger.pass(id).unwrap();
    assert_eq!(pass.dispute.map(|d| d.reason), Some(DisputeReason::AttestationRejected));
    // A rejected relay is not re-queued.
    assert!(f.ledger.pending_attestations(PASS_END + 200).is_empty());

    let expiry = PASS_END + 60 + DISPUTE_WINDOW + 1;
    let pass = f.ledger.sync_pass(Call::new(f.who.sat_owner, expiry), id).unwrap();
    assert_eq!(pass.cancel_reason, Some(CancelReason::VerificationFailed));
    assert_eq!(f.ledger.node(f.node_id).unwrap().stake_amount, NATIVE_UNIT - NATIVE_UNIT / 4);
}

#[test]
fn registration_requires_minimum_stake_and_valid_coordinates() {
    let mut f = Fixture::new();
    let owner = Call::new(f.who.node_owner, NOW);
    let node = |lat, stake| NodeRegistration {
        lat,
        lon: 777_093,
        specs: "UHF".into(),
        uptime: 95,
        stake,
        metadata_cid: None,
    };

    assert_eq!(
        f.ledger.register_node(owner, node(140_583, NATIVE_UNIT - 1)),
        Err(LedgerError::InsufficientStake { provided: NATIVE_UNIT - 1, required: NATIVE_UNIT })
    );
    assert_eq!(
        f.ledger.register_node(owner, node(900_001, NATIVE_UNIT)),
        Err(LedgerError::InvalidCoordinates { lat: 900_001, lon: 777_093 })
    );
    assert_eq!(
        f.ledger.register_satellite(
            Call::new(f.who.sat_owner, NOW),
            SatelliteRegistration {
                tle1:         ISS_L1.into(),
                tle2:         ISS_L2.into(),
                stake:        NATIVE_UNIT / 2,
                metadata_cid: None,
            },
        ),
        Err(LedgerError::InsufficientStake { provided: NATIVE_UNIT / 2, required: NATIVE_UNIT })
    );

    assert_eq!(f.ledger.nodes().count(), 1);
    assert_eq!(f.ledger.satellites().count(), 1);
    assert_eq!(f.balance(&glnk(), f.who.node_owner), 9 * NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), f.who.sat_owner), 9 * NATIVE_UNIT);
}

#[test]
fn booking_requires_active_records_and_satellite_ownership() {
    let mut f = Fixture::new();

    let req = f.booking(glnk(), NATIVE_UNIT);
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.node_owner, NOW), req),
        Err(LedgerError::NotOwner)
    );

    f.ledger.deactivate_node(Call::new(f.who.node_owner, NOW), f.node_id).unwrap();
    let req = f.booking(glnk(), NATIVE_UNIT);
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.sat_owner, NOW), req),
        Err(LedgerError::NodeInactive(f.node_id))
    );
    f.ledger.reactivate_node(Call::new(f.who.node_owner, NOW), f.node_id, 0).unwrap();

    f.ledger
        .deactivate_satellite(Call::new(f.who.sat_owner, NOW), f.satellite_id)
        .unwrap();
    let req = f.booking(glnk(), NATIVE_UNIT);
    assert_eq!(
        f.ledger.book_pass(Call::new(f.who.sat_owner, NOW), req),
        Err(LedgerError::SatelliteInactive(f.satellite_id))
    );
    assert_eq!(f.ledger.passes().count(), 0);
    assert_eq!(f.balance(&glnk(), Address::ESCROW), 0);
}

#[test]
fn confirmation_after_the_deadline_is_rejected() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), NATIVE_UNIT);
    // The confirmation window is capped at the lock boundary.
    let deadline = START - 3_600;
    assert_eq!(f.ledger.pass(id).unwrap().confirm_deadline, deadline);

    assert_eq!(
        f.ledger.confirm_pass(Call::new(f.who.node_owner, deadline + 1), id),
        Err(LedgerError::DeadlinePassed { pass_id: id, deadline })
    );
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Booked);
    // The payer can still get the money back.
    f.ledger.cancel_pass(Call::new(f.who.sat_owner, deadline + 1), id).unwrap();
}

#[test]
fn completion_requires_a_locked_pass_that_has_ended() {
    let mut f = Fixture::new();
    let id = f.book(glnk(), NATIVE_UNIT);
    let telemetry = RelayTelemetry { relay_timestamp: START + 120, bytes_relayed: 512 };

    assert_eq!(
        f.ledger.complete_pass(Call::new(f.who.node_owner, PASS_END + 60), id, [7u8; 32], telemetry),
        Err(LedgerError::InvalidState {
            pass_id:  id,
            current:  PassState::Booked,
            expected: PassState::Locked,
        })
    );

    f.ledger.confirm_pass(Call::new(f.who.node_owner, NOW + 60), id).unwrap();
    assert_eq!(
        f.ledger.complete_pass(Call::new(f.who.node_owner, NOW + 120), id, [7u8; 32], telemetry),
        Err(LedgerError::InvalidState {
            pass_id:  id,
            current:  PassState::Confirmed,
            expected: PassState::Locked,
        })
    );
    assert_eq!(
        f.ledger.complete_pass(Call::new(f.who.node_owner, PASS_END - 1), id, [7u8; 32], telemetry),
        Err(LedgerError::TooEarly { allowed_at: PASS_END, now: PASS_END - 1 })
    );
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Confirmed);

    f.ledger
        .complete_pass(Call::new(f.who.node_owner, PASS_END), id, [7u8; 32], telemetry)
        .unwrap();
    assert_eq!(f.ledger.pass(id).unwrap().state, PassState::Completed);
}

#[test]
fn slashed_node_reactivates_only_back_at_minimum_stake() {
    let mut f = Fixture::new();
    f.reach_consensus();
    let id = f.completed_pass();
    f.attest(id, false);
    let expiry = PASS_END + 60 + DISPUTE_WINDOW + 1;
    f.ledger.sync_pass(Call::new(f.who.sat_owner, expiry), id).unwrap();

    let owner = Call::new(f.who.node_owner, expiry + 10);
    let remaining = NATIVE_UNIT - NATIVE_UNIT / 4;
    assert_eq!(
        f.ledger.reactivate_node(owner, f.node_id, NATIVE_UNIT / 10),
        Err(LedgerError::InsufficientStake {
            provided: remaining + NATIVE_UNIT / 10,
            required: NATIVE_UNIT,
        })
    );
    assert!(!f.ledger.node(f.node_id).unwrap().active);

    f.ledger.reactivate_node(owner, f.node_id, NATIVE_UNIT / 4).unwrap();
    let node = f.ledger.node(f.node_id).unwrap();
    assert!(node.active);
    assert_eq!(node.stake_amount, NATIVE_UNIT);
    assert_eq!(f.balance(&glnk(), f.who.node_owner), 9 * NATIVE_UNIT - NATIVE_UNIT / 4);
    assert!(matches!(
        f.ledger.reactivate_node(owner, f.node_id, 0),
        Err(LedgerError::StillActive(_))
    ));
}
