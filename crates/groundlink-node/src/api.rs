//! HTTP API over the sequencer.
//!
//! Caller identity comes from `X-Caller: <hex address>`. Mutating routes also
//! require `Authorization: Bearer <secret>` when `--api-secret` is set.
//!
//! Ledger errors map to status codes by class: validation 400,
//! authorization 403, not found 404, state 409, economic 422.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use groundlink_ledger::{
    BnplEligibility, BookingRequest, Call, ConsensusResult, NewToken, Node, NodeRegistration,
    Pass, PaymentReceipt, RelayTelemetry, RewardReceipt, Satellite, SatelliteRegistration,
    SwapQuote, TokenInfo, Validator,
};
use groundlink_protocol::{
    types::hex_bytes32, Address, Amount, AttestationRequest, ErrorKind, EventRecord, LedgerError,
    NodeId, PassId, PassState, SatelliteId, Timestamp, TokenId,
};

use crate::sequencer::{now_secs, Sequencer};

/// Most events returned by one `GET /events` page.
const MAX_EVENTS_PER_PAGE: usize = 500;

// ============================================================================
// State & errors
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub seq:        Arc<Sequencer>,
    /// None = mutating routes unauthenticated (dev/local only).
    pub api_secret: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Unauthorized,
    BadRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind:  &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            ApiError::Ledger(e) => {
                let (status, kind) = match e.kind() {
                    ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
                    ErrorKind::Authorization => (StatusCode::FORBIDDEN, "authorization"),
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    ErrorKind::State => (StatusCode::CONFLICT, "state"),
                    ErrorKind::Economic => (StatusCode::UNPROCESSABLE_ENTITY, "economic"),
                };
                (status, kind, e.to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized".into()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "request", msg),
        };
        (status, Json(ErrorBody { error, kind })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;
type Done = Result<StatusCode, ApiError>;

fn ct_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());
    let mut diff: u8 = (a.len() ^ b.len()) as u8;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    diff == 0
}

/// Authenticate a mutating request and stamp it with the ledger clock.
fn call_from(state: &AppState, headers: &HeaderMap) -> Result<Call, ApiError> {
    if let Some(ref secret) = state.api_secret {
        let expected = format!("Bearer {secret}");
        let provided = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !ct_eq(provided, &expected) {
            return Err(ApiError::Unauthorized);
        }
    }
    let caller = headers
        .get("x-caller")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing X-Caller header".into()))?;
    let caller = parse_address(caller)?;
    if caller.is_system() {
        return Err(ApiError::BadRequest(format!("{caller} is a reserved protocol account")));
    }
    Ok(Call::new(caller, now_secs()))
}

fn parse_address(s: &str) -> Result<Address, ApiError> {
    s.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address {s:?}: {e}")))
}

fn parse_amount(s: &str) -> Result<Amount, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid amount {s:?}")))
}

// ============================================================================
// Server
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health",                          get(health))
        // Governance
        .route("/governance/validators",           post(add_validator))
        .route("/governance/validators/{address}", delete(remove_validator))
        .route("/governance/min-validators",       post(update_min_validators))
        .route("/governance/min-confidence",       post(update_min_confidence))
        .route("/governance/attestors",            post(set_attestor))
        .route("/governance/price-feeders",        post(set_price_feeder))
        .route("/governance/authorized-callers",   post(set_authorized_caller))
        .route("/governance/transfer",             post(transfer_governance))
        // Registry
        .route("/nodes",                           get(list_nodes).post(register_node))
        .route("/nodes/{id}",                      get(get_node))
        .route("/nodes/{id}/deactivate",           post(deactivate_node))
        .route("/nodes/{id}/reactivate",           post(reactivate_node))
        .route("/nodes/{id}/withdraw-stake",       post(withdraw_node_stake))
        .route("/nodes/{id}/uptime",               post(report_uptime))
        .route("/satellites",                      get(list_satellites).post(register_satellite))
        .route("/satellites/{id}",                 get(get_satellite))
        .route("/satellites/{id}/deactivate",      post(deactivate_satellite))
        .route("/satellites/{id}/tle",             post(update_satellite_tle))
        .route("/satellites/{id}/withdraw-stake",  post(withdraw_satellite_stake))
        // Oracle
        .route("/oracle/validators",               get(list_validators))
        .route("/oracle/tle",                      post(submit_tle))
        .route("/oracle/consensus/{satellite_id}", get(get_consensus))
        .route("/oracle/tle/{satellite_id}",       get(get_validated_tle))
        .route("/oracle/fresh/{satellite_id}",     get(get_tle_freshness))
        // Passes
        .route("/passes",                          get(list_passes).post(book_pass))
        .route("/passes/pending-attestations",     get(pending_attestations))
        .route("/passes/{id}",                     get(get_pass))
        .route("/passes/{id}/confirm",             post(confirm_pass))
        .route("/passes/{id}/cancel",              post(cancel_pass))
        .route("/passes/{id}/complete",            post(complete_pass))
        .route("/passes/{id}/sync",                post(sync_pass))
        .route("/passes/{id}/attest",              post(submit_attestation))
        .route("/passes/{id}/claim",               post(claim_reward))
        // Tokens & payments
        .route("/tokens",                          get(list_tokens).post(register_token))
        .route("/tokens/{symbol}",                 get(get_token))
        .route("/tokens/{symbol}/supported",       post(set_token_supported))
        .route("/tokens/{symbol}/price",           post(update_price))
        .route("/tokens/{symbol}/emergency-price", post(emergency_set_price))
        .route("/quote",                           get(get_quote))
        .route("/swap",                            post(swap))
        .route("/payments",                        post(route_payment))
        .route("/deposits",                        post(deposit))
        .route("/transfers",                       post(transfer))
        .route("/balances/{symbol}/{address}",     get(get_balance))
        // Credit
        .route("/credit/boost",                    post(boost_credit))
        .route("/credit/relay-completion",         post(record_relay_completion))
        .route("/credit/{address}",                get(get_credit_score))
        .route("/credit/{address}/bnpl",           get(get_bnpl_eligibility))
        // Events
        .route("/events",                          get(get_events))
        .route("/events/root",                     get(get_events_root))
        .route("/events/{seq}/proof",              get(get_event_proof))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Serialize)]
struct Created {
    id: u64,
}

#[derive(Serialize)]
struct AmountBody {
    amount: Amount,
}

#[derive(Serialize)]
struct ScoreBody {
    address: Address,
    score:   u16,
}

#[derive(Deserialize)]
struct AddressBody {
    address: Address,
}

#[derive(Deserialize)]
struct RoleToggle {
    address: Address,
    enabled: bool,
}

#[derive(Deserialize)]
struct U32Value {
    value: u32,
}

#[derive(Deserialize)]
struct U8Value {
    value: u8,
}

#[derive(Deserialize)]
struct GovernanceTransfer {
    to: Address,
}

#[derive(Deserialize)]
struct TopUp {
    #[serde(default)]
    top_up: Amount,
}

#[derive(Deserialize)]
struct UptimeReport {
    uptime: u8,
}

#[derive(Deserialize)]
struct TleUpdate {
    tle1: String,
    tle2: String,
}

#[derive(Deserialize)]
struct TleSubmission {
    satellite_id: SatelliteId,
    line1:        String,
    line2:        String,
    observed_at:  Timestamp,
    confidence:   u8,
}

#[derive(Serialize)]
struct TleSubmitted {
    consensus: Option<ConsensusResult>,
}

#[derive(Serialize)]
struct Freshness {
    satellite_id: SatelliteId,
    fresh:        bool,
}

#[derive(Serialize)]
struct PassView {
    #[serde(flatten)]
    pass:            Pass,
    /// State including any due transition not yet synced.
    effective_state: PassState,
}

#[derive(Deserialize)]
struct CompletionReport {
    #[serde(with = "hex_bytes32")]
    proof_hash:      [u8; 32],
    relay_timestamp: Timestamp,
    #[serde(default)]
    bytes_relayed:   u64,
}

#[derive(Deserialize)]
struct AttestationVerdict {
    valid: bool,
}

#[derive(Serialize)]
struct AttestationOutcome {
    pass_id: PassId,
    state:   PassState,
}

#[derive(Deserialize, Default)]
struct ClaimRequest {
    #[serde(default)]
    expected_payout: Option<Amount>,
}

#[derive(Deserialize)]
struct SupportedFlag {
    supported: bool,
}

#[derive(Deserialize)]
struct PriceUpdate {
    price:      Amount,
    timestamp:  Timestamp,
    confidence: u8,
}

#[derive(Deserialize)]
struct EmergencyPrice {
    price: Amount,
}

#[derive(Deserialize)]
struct QuoteQuery {
    from:   TokenId,
    to:     TokenId,
    amount: String,
}

#[derive(Deserialize)]
struct SwapRequest {
    from:         TokenId,
    to:           TokenId,
    amount:       Amount,
    #[serde(default)]
    expected_out: Option<Amount>,
}

#[derive(Deserialize)]
struct PaymentRequest {
    from_token:   TokenId,
    to:           Address,
    amount:       Amount,
    #[serde(default)]
    expected_out: Option<Amount>,
}

#[derive(Deserialize)]
struct FundsMove {
    token:  TokenId,
    to:     Address,
    amount: Amount,
}

#[derive(Serialize)]
struct BalanceBody {
    token:   TokenId,
    address: Address,
    balance: Amount,
}

#[derive(Deserialize)]
struct Boost {
    user:   Address,
    points: u16,
}

#[derive(Deserialize)]
struct RelayCompletion {
    user: Address,
}

#[derive(Deserialize)]
struct BnplQuery {
    amount: String,
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default)]
    since: u64,
}

#[derive(Serialize)]
struct EventsRoot {
    root:     String,
    entries:  usize,
    last_seq: u64,
}

#[derive(Serialize)]
struct EventProof {
    seq:   u64,
    leaf:  String,
    proof: Vec<String>,
    root:  String,
}

// ============================================================================
// Health
// ============================================================================

async fn health(State(st): State<AppState>) -> impl IntoResponse {
    let last_seq = st.seq.read(|l| l.last_seq()).await;
    Json(json!({ "status": "ok", "last_seq": last_seq }))
}

// ============================================================================
// Governance
// ============================================================================

async fn add_validator(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<AddressBody>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.add_validator(call, body.address)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_validator(
    State(st):     State<AppState>,
    Path(address): Path<String>,
    headers:       HeaderMap,
) -> Done {
    let call = call_from(&st, &headers)?;
    let validator = parse_address(&address)?;
    st.seq.apply(|l| l.remove_validator(call, validator)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_min_validators(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<U32Value>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.update_min_validators(call, body.value)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_min_confidence(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<U8Value>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.update_min_confidence(call, body.value)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_attestor(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<RoleToggle>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.set_attestor(call, body.address, body.enabled)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_price_feeder(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<RoleToggle>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.set_price_feeder(call, body.address, body.enabled)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_authorized_caller(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<RoleToggle>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq
        .apply(|l| l.set_authorized_caller(call, body.address, body.enabled))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transfer_governance(
    State(st):  State<AppState>,
    headers:    HeaderMap,
    Json(body): Json<GovernanceTransfer>,
) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.transfer_governance(call, body.to)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Registry
// ============================================================================

async fn list_nodes(State(st): State<AppState>) -> Json<Vec<Node>> {
    Json(st.seq.read(|l| l.nodes().cloned().collect()).await)
}

async fn get_node(State(st): State<AppState>, Path(id): Path<NodeId>) -> ApiResult<Node> {
    Ok(Json(st.seq.read(|l| l.node(id).cloned()).await?))
}

async fn register_node(
    State(st): State<AppState>,
    headers:   HeaderMap,
    Json(req): Json<NodeRegistration>,
) -> ApiResult<Created> {
    let call = call_from(&st, &headers)?;
    let id = st.seq.apply(|l| l.register_node(call, req)).await?;
    Ok(Json(Created { id }))
}

async fn deactivate_node(State(st): State<AppState>, Path(id): Path<NodeId>, headers: HeaderMap) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.deactivate_node(call, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reactivate_node(
    State(st):  State<AppState>,
    Path(id):   Path<NodeId>,
    headers:    HeaderMap,
    Json(body): Json<TopUp>,
) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.reactivate_node(call, id, body.top_up)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn withdraw_node_stake(
    State(st): State<AppState>,
    Path(id):  Path<NodeId>,
    headers:   HeaderMap,
) -> ApiResult<AmountBody> {
    let call = call_from(&st, &headers)?;
    let amount = st.seq.apply(|l| l.withdraw_node_stake(call, id)).await?;
    Ok(Json(AmountBody { amount }))
}

async fn report_uptime(
    State(st):  State<AppState>,
    Path(id):   Path<NodeId>,
    headers:    HeaderMap,
    Json(body): Json<UptimeReport>,
) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.report_uptime(call, id, body.uptime)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_satellites(State(st): State<AppState>) -> Json<Vec<Satellite>> {
    Json(st.seq.read(|l| l.satellites().cloned().collect()).await)
}

async fn get_satellite(State(st): State<AppState>, Path(id): Path<SatelliteId>) -> ApiResult<Satellite> {
    Ok(Json(st.seq.read(|l| l.satellite(id).cloned()).await?))
}

async fn register_satellite(
    State(st): State<AppState>,
    headers:   HeaderMap,
    Json(req): Json<SatelliteRegistration>,
) -> ApiResult<Created> {
    let call = call_from(&st, &headers)?;
    let id = st.seq.apply(|l| l.register_satellite(call, req)).await?;
    Ok(Json(Created { id }))
}

async fn deactivate_satellite(State(st): State<AppState>, Path(id): Path<SatelliteId>, headers: HeaderMap) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.deactivate_satellite(call, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_satellite_tle(
    State(st):  State<AppState>,
    Path(id):   Path<SatelliteId>,
    headers:    HeaderMap,
    Json(body): Json<TleUpdate>,
) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq
        .apply(|l| l.update_satellite_tle(call, id, body.tle1, body.tle2))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn withdraw_satellite_stake(
    State(st): State<AppState>,
    Path(id):  Path<SatelliteId>,
    headers:   HeaderMap,
) -> ApiResult<AmountBody> {
    let call = call_from(&st, &headers)?;
    let amount = st.seq.apply(|l| l.withdraw_satellite_stake(call, id)).await?;
    Ok(Json(AmountBody { amount }))
}

// ============================================================================
// Oracle
// ============================================================================

async fn list_validators(State(st): State<AppState>) -> Json<Vec<Validator>> {
    Json(st.seq.read(|l| l.validators().cloned().collect()).await)
}

async fn submit_tle(
    State(st):  State<AppState>,
    headers:    HeaderMap,
    Json(body): Json<TleSubmission>,
) -> ApiResult<TleSubmitted> {
    let call = call_from(&st, &headers)?;
    let consensus = st
        .seq
        .apply(|l| {
            l.submit_tle(call, body.satellite_id, &body.line1, &body.line2, body.observed_at, body.confidence)
        })
        .await?;
    Ok(Json(TleSubmitted { consensus }))
}

async fn get_consensus(State(st): State<AppState>, Path(satellite_id): Path<SatelliteId>) -> ApiResult<ConsensusResult> {
    st.seq
        .read(|l| l.consensus(satellite_id).cloned())
        .await
        .map(Json)
        .ok_or(ApiError::Ledger(LedgerError::NoValidTle(satellite_id)))
}

async fn get_validated_tle(
    State(st):          State<AppState>,
    Path(satellite_id): Path<SatelliteId>,
) -> ApiResult<ConsensusResult> {
    Ok(Json(st.seq.read(|l| l.validated_tle(satellite_id).cloned()).await?))
}

async fn get_tle_freshness(State(st): State<AppState>, Path(satellite_id): Path<SatelliteId>) -> Json<Freshness> {
    let now = now_secs();
    let fresh = st.seq.read(|l| l.is_tle_fresh(satellite_id, now)).await;
    Json(Freshness { satellite_id, fresh })
}

// ============================================================================
// Passes
// ============================================================================

async fn list_passes(State(st): State<AppState>) -> Json<Vec<Pass>> {
    Json(st.seq.read(|l| l.passes().cloned().collect()).await)
}

async fn get_pass(State(st): State<AppState>, Path(id): Path<PassId>) -> ApiResult<PassView> {
    let now = now_secs();
    let view = st
        .seq
        .read(|l| {
            let pass = l.pass(id)?.clone();
            let effective_state = pass.effective_state(now, l.params());
            Ok::<_, LedgerError>(PassView { pass, effective_state })
        })
        .await?;
    Ok(Json(view))
}

async fn pending_attestations(State(st): State<AppState>) -> Json<Vec<AttestationRequest>> {
    let now = now_secs();
    Json(st.seq.read(|l| l.pending_attestations(now)).await)
}

async fn book_pass(
    State(st): State<AppState>,
    headers:   HeaderMap,
    Json(req): Json<BookingRequest>,
) -> ApiResult<Created> {
    let call = call_from(&st, &headers)?;
    let id = st.seq.apply(|l| l.book_pass(call, req)).await?;
    Ok(Json(Created { id }))
}

async fn confirm_pass(State(st): State<AppState>, Path(id): Path<PassId>, headers: HeaderMap) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.confirm_pass(call, id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_pass(
    State(st): State<AppState>,
    Path(id):  Path<PassId>,
    headers:   HeaderMap,
) -> ApiResult<AmountBody> {
    let call = call_from(&st, &headers)?;
    let amount = st.seq.apply(|l| l.cancel_pass(call, id)).await?;
    Ok(Json(AmountBody { amount }))
}

async fn complete_pass(
    State(st):  State<AppState>,
    Path(id):   Path<PassId>,
    headers:    HeaderMap,
    Json(body): Json<CompletionReport>,
) -> Done {
    let call = call_from(&st, &headers)?;
    let telemetry = RelayTelemetry {
        relay_timestamp: body.relay_timestamp,
        bytes_relayed:   body.bytes_relayed,
    };
    st.seq
        .apply(|l| l.complete_pass(call, id, body.proof_hash, telemetry))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_pass(State(st): State<AppState>, Path(id): Path<PassId>, headers: HeaderMap) -> ApiResult<Pass> {
    let call = call_from(&st, &headers)?;
    Ok(Json(st.seq.apply(|l| l.sync_pass(call, id)).await?))
}

async fn submit_attestation(
    State(st):  State<AppState>,
    Path(id):   Path<PassId>,
    headers:    HeaderMap,
    Json(body): Json<AttestationVerdict>,
) -> ApiResult<AttestationOutcome> {
    let call = call_from(&st, &headers)?;
    let state = st.seq.apply(|l| l.submit_attestation(call, id, body.valid)).await?;
    Ok(Json(AttestationOutcome { pass_id: id, state }))
}

async fn claim_reward(
    State(st):  State<AppState>,
    Path(id):   Path<PassId>,
    headers:    HeaderMap,
    body:       Bytes,
) -> ApiResult<RewardReceipt> {
    let call = call_from(&st, &headers)?;
    // Body is optional; an empty one claims without a payout floor.
    let body: ClaimRequest = if body.is_empty() {
        ClaimRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid claim body: {e}")))?
    };
    let receipt = st
        .seq
        .apply(|l| l.claim_reward(call, id, body.expected_payout))
        .await?;
    Ok(Json(receipt))
}

// ============================================================================
// Tokens & payments
// ============================================================================

async fn list_tokens(State(st): State<AppState>) -> Json<Vec<TokenInfo>> {
    Json(st.seq.read(|l| l.tokens().cloned().collect()).await)
}

async fn get_token(State(st): State<AppState>, Path(symbol): Path<String>) -> ApiResult<TokenInfo> {
    let token = TokenId::new(&symbol);
    st.seq
        .read(|l| l.token(&token).cloned())
        .await
        .map(Json)
        .ok_or(ApiError::Ledger(LedgerError::UnsupportedToken(token)))
}

async fn register_token(State(st): State<AppState>, headers: HeaderMap, Json(req): Json<NewToken>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.register_token(call, req)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_token_supported(
    State(st):    State<AppState>,
    Path(symbol): Path<String>,
    headers:      HeaderMap,
    Json(body):   Json<SupportedFlag>,
) -> Done {
    let call = call_from(&st, &headers)?;
    let token = TokenId::new(&symbol);
    st.seq
        .apply(|l| l.set_token_supported(call, &token, body.supported))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_price(
    State(st):    State<AppState>,
    Path(symbol): Path<String>,
    headers:      HeaderMap,
    Json(body):   Json<PriceUpdate>,
) -> Done {
    let call = call_from(&st, &headers)?;
    let token = TokenId::new(&symbol);
    st.seq
        .apply(|l| l.update_price(call, &token, body.price, body.timestamp, body.confidence))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn emergency_set_price(
    State(st):    State<AppState>,
    Path(symbol): Path<String>,
    headers:      HeaderMap,
    Json(body):   Json<EmergencyPrice>,
) -> Done {
    let call = call_from(&st, &headers)?;
    let token = TokenId::new(&symbol);
    st.seq.apply(|l| l.emergency_set_price(call, &token, body.price)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_quote(State(st): State<AppState>, Query(q): Query<QuoteQuery>) -> ApiResult<SwapQuote> {
    let amount = parse_amount(&q.amount)?;
    let now = now_secs();
    let quote = st
        .seq
        .read(|l| l.calculate_swap(&q.from, &q.to, amount, now))
        .await?;
    Ok(Json(quote))
}

async fn swap(State(st): State<AppState>, headers: HeaderMap, Json(req): Json<SwapRequest>) -> ApiResult<PaymentReceipt> {
    let call = call_from(&st, &headers)?;
    let receipt = st
        .seq
        .apply(|l| l.swap(call, &req.from, &req.to, req.amount, req.expected_out))
        .await?;
    Ok(Json(receipt))
}

async fn route_payment(
    State(st): State<AppState>,
    headers:   HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<PaymentReceipt> {
    let call = call_from(&st, &headers)?;
    let receipt = st
        .seq
        .apply(|l| l.route_payment(call, &req.from_token, req.to, req.amount, req.expected_out))
        .await?;
    Ok(Json(receipt))
}

async fn deposit(State(st): State<AppState>, headers: HeaderMap, Json(req): Json<FundsMove>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.deposit(call, &req.token, req.to, req.amount)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transfer(State(st): State<AppState>, headers: HeaderMap, Json(req): Json<FundsMove>) -> Done {
    let call = call_from(&st, &headers)?;
    st.seq.apply(|l| l.transfer(call, &req.token, req.to, req.amount)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_balance(
    State(st):               State<AppState>,
    Path((symbol, address)): Path<(String, String)>,
) -> ApiResult<BalanceBody> {
    let token = TokenId::new(&symbol);
    let address = parse_address(&address)?;
    let balance = st.seq.read(|l| l.balance_of(&token, &address)).await;
    Ok(Json(BalanceBody { token, address, balance }))
}

// ============================================================================
// Credit
// ============================================================================

async fn get_credit_score(State(st): State<AppState>, Path(address): Path<String>) -> ApiResult<ScoreBody> {
    let address = parse_address(&address)?;
    let score = st.seq.read(|l| l.credit_score(&address)).await;
    Ok(Json(ScoreBody { address, score }))
}

async fn get_bnpl_eligibility(
    State(st):     State<AppState>,
    Path(address): Path<String>,
    Query(q):      Query<BnplQuery>,
) -> ApiResult<BnplEligibility> {
    let address = parse_address(&address)?;
    let amount = parse_amount(&q.amount)?;
    Ok(Json(st.seq.read(|l| l.check_bnpl_eligibility(&address, amount)).await))
}

async fn boost_credit(State(st): State<AppState>, headers: HeaderMap, Json(body): Json<Boost>) -> ApiResult<ScoreBody> {
    let call = call_from(&st, &headers)?;
    let score = st.seq.apply(|l| l.boost_credit(call, body.user, body.points)).await?;
    Ok(Json(ScoreBody { address: body.user, score }))
}

async fn record_relay_completion(
    State(st):  State<AppState>,
    headers:    HeaderMap,
    Json(body): Json<RelayCompletion>,
) -> ApiResult<ScoreBody> {
    let call = call_from(&st, &headers)?;
    let score = st.seq.apply(|l| l.record_relay_completion(call, body.user)).await?;
    Ok(Json(ScoreBody { address: body.user, score }))
}

// ============================================================================
// Events
// ============================================================================

async fn get_events(State(st): State<AppState>, Query(q): Query<EventsQuery>) -> Json<Vec<EventRecord>> {
    let page = st
        .seq
        .read(|l| {
            l.events_since(q.since)
                .iter()
                .take(MAX_EVENTS_PER_PAGE)
                .cloned()
                .collect()
        })
        .await;
    Json(page)
}

async fn get_events_root(State(st): State<AppState>) -> Json<EventsRoot> {
    let (root, entries) = st.seq.journal(|j| (j.root(), j.len())).await;
    let last_seq = st.seq.read(|l| l.last_seq()).await;
    Json(EventsRoot { root: hex::encode(root), entries, last_seq })
}

async fn get_event_proof(State(st): State<AppState>, Path(seq): Path<u64>) -> ApiResult<EventProof> {
    let found = st.seq.journal(|j| j.proof(seq).map(|proof| (proof, j.root()))).await;
    let Some(((leaf, proof), root)) = found else {
        return Err(ApiError::BadRequest(format!("no journal entry {seq}")));
    };
    Ok(Json(EventProof {
        seq,
        leaf: hex::encode(leaf),
        proof: proof.iter().map(hex::encode).collect(),
        root: hex::encode(root),
    }))
}
