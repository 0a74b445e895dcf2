//! # REST API
//!
//! Builds the axum router for the treasury host. Every mutating endpoint
//! takes a JSON body naming the `caller`; the ledger enforces roles, so the
//! API itself does no authorization beyond parsing. The `/assets` faucet is
//! mounted on devnet only and never mints the backed token.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                         |
//! |--------|-----------------------------------|-------------------------------------|
//! | GET    | `/health`                         | Liveness probe                      |
//! | GET    | `/status`                         | Node and ledger status              |
//! | GET    | `/treasury`                       | Treasury summary                    |
//! | GET    | `/permissions/:category`          | Addresses holding a category        |
//! | GET    | `/permissions/:category/:address` | Permission, pending change, binding |
//! | GET    | `/debt/:debtor/:token`            | Outstanding debt of one debtor      |
//! | GET    | `/tokens/:token`                  | Reserve token listing and balance   |
//! | GET    | `/vault`                          | Vault pointer and its timelock      |
//! | POST   | `/treasury/queue`                 | Queue a permission change           |
//! | POST   | `/treasury/toggle`                | Apply a matured permission change   |
//! | POST   | `/treasury/deposit`               | Deposit reserves, mint backed token |
//! | POST   | `/treasury/withdraw`              | Burn backed token for reserves      |
//! | POST   | `/treasury/incur-debt`            | Borrow reserves against stake       |
//! | POST   | `/treasury/repay`                 | Repay debt in the borrowed token    |
//! | POST   | `/treasury/manage`                | Draw excess reserves                |
//! | POST   | `/treasury/mint-rewards`          | Mint backed token from excess       |
//! | POST   | `/treasury/audit`                 | Recompute total reserves            |
//! | POST   | `/treasury/management/:step`      | push, pull or renounce control      |
//! | POST   | `/vault/open`                     | Open the vault timelock             |
//! | POST   | `/vault/cancel`                   | Cancel the vault timelock           |
//! | POST   | `/vault/set`                      | Repoint the vault                   |
//! | POST   | `/vault/management/:step`         | push, pull or renounce control      |
//! | POST   | `/assets/register`                | Register a token (devnet faucet)    |
//! | POST   | `/assets/mint`                    | Mint a token (devnet faucet)        |
//! | POST   | `/assets/approve`                 | Set an allowance (devnet faucet)    |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use reserve_contracts::{PermissionCategory, ReserveTokenInfo, TreasurySummary, VaultView};
use reserve_protocol::{Address, Amount, AssetLedger, Clock, Timestamp};

use crate::host::{Host, HostError};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    /// Network identifier ("devnet", "testnet", ...).
    pub network: String,
    pub host: Arc<Host>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// The only network that mounts the `/assets` faucet.
pub const FAUCET_NETWORK: &str = "devnet";

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/treasury", get(treasury_handler))
        .route("/permissions/:category", get(holders_handler))
        .route("/permissions/:category/:address", get(permission_handler))
        .route("/debt/:debtor/:token", get(debt_handler))
        .route("/tokens/:token", get(token_handler))
        .route("/vault", get(vault_handler))
        .route("/treasury/queue", post(queue_handler))
        .route("/treasury/toggle", post(toggle_handler))
        .route("/treasury/deposit", post(deposit_handler))
        .route("/treasury/withdraw", post(withdraw_handler))
        .route("/treasury/incur-debt", post(incur_debt_handler))
        .route("/treasury/repay", post(repay_handler))
        .route("/treasury/manage", post(manage_handler))
        .route("/treasury/mint-rewards", post(mint_rewards_handler))
        .route("/treasury/audit", post(audit_handler))
        .route("/treasury/management/:step", post(treasury_management_handler))
        .route("/vault/open", post(vault_open_handler))
        .route("/vault/cancel", post(vault_cancel_handler))
        .route("/vault/set", post(vault_set_handler))
        .route("/vault/management/:step", post(vault_management_handler));

    if state.network == FAUCET_NETWORK {
        router = router
            .route("/assets/register", post(register_asset_handler))
            .route("/assets/mint", post(mint_asset_handler))
            .route("/assets/approve", post(approve_asset_handler));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body returned with every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Host(HostError),
}

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        ApiError::Host(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Host(e) => {
                let status = match &e {
                    HostError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    e if e.is_unauthorized() => StatusCode::FORBIDDEN,
                    e if e.is_conflict() => StatusCode::CONFLICT,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, e.kind(), e.to_string())
            }
        };
        let body = ErrorResponse {
            error,
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("{raw}: {e}")))
}

fn parse_category(raw: &str) -> Result<PermissionCategory, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response returned by the `/status` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub treasury: Address,
    pub controller: Address,
    pub vault: Address,
    pub total_reserves: Amount,
    pub total_debt: Amount,
    pub ledger_records: usize,
    /// BLAKE3 digest over the persisted ledger.
    pub ledger_digest: String,
    /// ISO 8601 wall-clock time of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub category: PermissionCategory,
    pub address: Address,
    pub active: bool,
    pub pending_matures_at: Option<Timestamp>,
    pub remaining: Option<u64>,
    pub binding: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HoldersResponse {
    pub category: PermissionCategory,
    pub holders: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebtResponse {
    pub debtor: Address,
    pub token: Address,
    /// Outstanding amount in token units.
    pub outstanding: Amount,
    /// All of the debtor's debt, valued in backed-token units.
    pub debtor_value: Option<Amount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: ReserveTokenInfo,
    pub treasury_balance: Amount,
}

/// Envelope for every successful mutation.
#[derive(Debug, Serialize)]
pub struct OpResponse<T> {
    pub op: &'static str,
    pub result: T,
}

impl<T> OpResponse<T> {
    fn new(op: &'static str, result: T) -> Json<Self> {
        Json(Self { op, result })
    }
}

#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub caller: Address,
    pub category: String,
    pub address: Address,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub caller: Address,
    pub category: String,
    pub address: Address,
    /// Distribution, calculator or staked-token address for binding
    /// categories.
    #[serde(default)]
    pub payment: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub caller: Address,
    pub token: Address,
    pub amount: Amount,
    #[serde(default)]
    pub profit: Amount,
}

/// Body shared by withdraw, incur-debt, repay and manage.
#[derive(Debug, Deserialize)]
pub struct TokenAmountRequest {
    pub caller: Address,
    pub token: Address,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub caller: Address,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub caller: Address,
}

#[derive(Debug, Deserialize)]
pub struct ManagementRequest {
    pub caller: Address,
    /// Required for `push`.
    #[serde(default)]
    pub successor: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct VaultSetRequest {
    pub caller: Address,
    pub vault: Address,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAssetRequest {
    pub token: Address,
    pub decimals: u8,
}

#[derive(Debug, Deserialize)]
pub struct MintAssetRequest {
    pub token: Address,
    pub to: Address,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub caller: Address,
    pub token: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct Queued {
    pub category: PermissionCategory,
    pub address: Address,
    pub matures_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct Toggled {
    pub category: PermissionCategory,
    pub address: Address,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let store = state.host.store();
    let ledger_digest = store.digest_hex().map_err(HostError::from)?;
    let resp = state.host.read(|l| StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        treasury: l.treasury.state().address,
        controller: l.treasury.controller(),
        vault: l.vault.vault(),
        total_reserves: l.treasury.total_reserves(),
        total_debt: l.treasury.total_debt(),
        ledger_records: store.record_count(),
        ledger_digest,
        timestamp: chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(resp))
}

/// `GET /treasury`
async fn treasury_handler(State(state): State<AppState>) -> Json<TreasurySummary> {
    Json(state.host.read(|l| l.treasury.summary()))
}

/// `GET /permissions/:category`
async fn holders_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<HoldersResponse> {
    let category = parse_category(&category)?;
    let holders = state.host.read(|l| l.treasury.holders(category));
    Ok(Json(HoldersResponse { category, holders }))
}

/// `GET /permissions/:category/:address`
async fn permission_handler(
    State(state): State<AppState>,
    Path((category, address)): Path<(String, String)>,
) -> ApiResult<PermissionResponse> {
    let category = parse_category(&category)?;
    let address = parse_address(&address)?;
    let resp = state.host.read(|l| {
        let now = l.treasury.clock().now();
        let pending = l.treasury.pending(category, &address);
        PermissionResponse {
            category,
            address,
            active: l.treasury.is_permitted(category, &address),
            pending_matures_at: pending.and_then(|p| p.matures_at()),
            remaining: pending.and_then(|p| p.remaining(now)),
            binding: l.treasury.binding(category, &address),
        }
    });
    Ok(Json(resp))
}

/// `GET /debt/:debtor/:token`
async fn debt_handler(
    State(state): State<AppState>,
    Path((debtor, token)): Path<(String, String)>,
) -> ApiResult<DebtResponse> {
    let debtor = parse_address(&debtor)?;
    let token = parse_address(&token)?;
    let resp = state.host.read(|l| DebtResponse {
        debtor,
        token,
        outstanding: l.treasury.debt_of(&debtor, &token),
        debtor_value: l.treasury.debtor_value(&debtor).ok(),
    });
    Ok(Json(resp))
}

/// `GET /tokens/:token` - 404 if the token was never listed.
async fn token_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<TokenResponse> {
    let token = parse_address(&token)?;
    state
        .host
        .read(|l| {
            let info = *l.treasury.reserve_token(&token)?;
            let treasury_balance = l
                .treasury
                .assets()
                .balance_of(&token, &l.treasury.state().address);
            Some(TokenResponse {
                token: info,
                treasury_balance,
            })
        })
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{token} is not a listed reserve token")))
}

/// `GET /vault`
async fn vault_handler(State(state): State<AppState>) -> Json<VaultView> {
    Json(state.host.read(|l| l.vault.view()))
}

// ---------------------------------------------------------------------------
// Treasury Handlers
// ---------------------------------------------------------------------------

/// `POST /treasury/queue`
async fn queue_handler(
    State(state): State<AppState>,
    Json(req): Json<QueueRequest>,
) -> Result<Json<OpResponse<Queued>>, ApiError> {
    let category = parse_category(&req.category)?;
    let matures_at = state.host.apply("queue", |l| {
        l.treasury.queue(&req.caller, category, req.address)
    })?;
    Ok(OpResponse::new(
        "queue",
        Queued {
            category,
            address: req.address,
            matures_at,
        },
    ))
}

/// `POST /treasury/toggle`
async fn toggle_handler(
    State(state): State<AppState>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<OpResponse<Toggled>>, ApiError> {
    let category = parse_category(&req.category)?;
    let payment = req.payment.unwrap_or(Address::ZERO);
    let active = state.host.apply("toggle", |l| {
        l.treasury.toggle(&req.caller, category, req.address, payment)
    })?;
    Ok(OpResponse::new(
        "toggle",
        Toggled {
            category,
            address: req.address,
            active,
        },
    ))
}

/// `POST /treasury/deposit` - returns the amount minted.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let minted = state.host.apply("deposit", |l| {
        l.treasury
            .deposit(&req.caller, req.amount, &req.token, req.profit)
    })?;
    Ok(OpResponse::new("deposit", minted))
}

/// `POST /treasury/withdraw` - returns the backed-token value burned.
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<TokenAmountRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let value = state.host.apply("withdraw", |l| {
        l.treasury.withdraw(&req.caller, req.amount, &req.token)
    })?;
    Ok(OpResponse::new("withdraw", value))
}

/// `POST /treasury/incur-debt` - returns the value added to total debt.
async fn incur_debt_handler(
    State(state): State<AppState>,
    Json(req): Json<TokenAmountRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let added = state.host.apply("incur_debt", |l| {
        l.treasury.incur_debt(&req.caller, req.amount, &req.token)
    })?;
    Ok(OpResponse::new("incur_debt", added))
}

/// `POST /treasury/repay` - returns the value removed from total debt.
async fn repay_handler(
    State(state): State<AppState>,
    Json(req): Json<TokenAmountRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let removed = state.host.apply("repay", |l| {
        l.treasury
            .repay_debt_with_reserve(&req.caller, req.amount, &req.token)
    })?;
    Ok(OpResponse::new("repay", removed))
}

/// `POST /treasury/manage`
async fn manage_handler(
    State(state): State<AppState>,
    Json(req): Json<TokenAmountRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let value = state.host.apply("manage", |l| {
        l.treasury.manage(&req.caller, &req.token, req.amount)
    })?;
    Ok(OpResponse::new("manage", value))
}

/// `POST /treasury/mint-rewards` - returns the recipient.
async fn mint_rewards_handler(
    State(state): State<AppState>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<OpResponse<Address>>, ApiError> {
    let recipient = state.host.apply("mint_rewards", |l| {
        l.treasury.mint_rewards(&req.caller, req.amount)
    })?;
    Ok(OpResponse::new("mint_rewards", recipient))
}

/// `POST /treasury/audit` - open to anyone; returns the new total.
async fn audit_handler(State(state): State<AppState>) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let total = state
        .host
        .apply("audit", |l| l.treasury.audit_reserves())?;
    Ok(OpResponse::new("audit", total))
}

/// `POST /treasury/management/:step` where step is push, pull or renounce.
async fn treasury_management_handler(
    State(state): State<AppState>,
    Path(step): Path<String>,
    Json(req): Json<ManagementRequest>,
) -> Result<Json<OpResponse<Address>>, ApiError> {
    match step.as_str() {
        "push" => {
            let successor = required_successor(&req)?;
            state.host.apply("treasury_push", |l| {
                l.treasury.push_management(&req.caller, successor)
            })?;
        }
        "pull" => state
            .host
            .apply("treasury_pull", |l| l.treasury.pull_management(&req.caller))?,
        "renounce" => state.host.apply("treasury_renounce", |l| {
            l.treasury.renounce_management(&req.caller)
        })?,
        other => return Err(unknown_step(other)),
    }
    let controller = state.host.read(|l| l.treasury.controller());
    Ok(OpResponse::new("treasury_management", controller))
}

// ---------------------------------------------------------------------------
// Vault Handlers
// ---------------------------------------------------------------------------

/// `POST /vault/open` - returns the maturity timestamp.
async fn vault_open_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<OpResponse<Timestamp>>, ApiError> {
    let matures_at = state
        .host
        .apply("vault_open", |l| l.vault.open_timelock(&req.caller))?;
    Ok(OpResponse::new("vault_open", matures_at))
}

/// `POST /vault/cancel`
async fn vault_cancel_handler(
    State(state): State<AppState>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<OpResponse<VaultView>>, ApiError> {
    state
        .host
        .apply("vault_cancel", |l| l.vault.cancel_timelock(&req.caller))?;
    Ok(OpResponse::new("vault_cancel", state.host.read(|l| l.vault.view())))
}

/// `POST /vault/set` - returns the previous vault.
async fn vault_set_handler(
    State(state): State<AppState>,
    Json(req): Json<VaultSetRequest>,
) -> Result<Json<OpResponse<Address>>, ApiError> {
    let previous = state
        .host
        .apply("vault_set", |l| l.vault.set_vault(&req.caller, req.vault))?;
    Ok(OpResponse::new("vault_set", previous))
}

/// `POST /vault/management/:step`
async fn vault_management_handler(
    State(state): State<AppState>,
    Path(step): Path<String>,
    Json(req): Json<ManagementRequest>,
) -> Result<Json<OpResponse<Address>>, ApiError> {
    match step.as_str() {
        "push" => {
            let successor = required_successor(&req)?;
            state.host.apply("vault_push", |l| {
                l.vault.push_management(&req.caller, successor)
            })?;
        }
        "pull" => state
            .host
            .apply("vault_pull", |l| l.vault.pull_management(&req.caller))?,
        "renounce" => state
            .host
            .apply("vault_renounce", |l| l.vault.renounce_management(&req.caller))?,
        other => return Err(unknown_step(other)),
    }
    let controller = state.host.read(|l| l.vault.controller());
    Ok(OpResponse::new("vault_management", controller))
}

fn required_successor(req: &ManagementRequest) -> Result<Address, ApiError> {
    req.successor
        .ok_or_else(|| ApiError::BadRequest("push requires a successor".into()))
}

fn unknown_step(step: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "unknown management step '{step}' (expected push, pull or renounce)"
    ))
}

// ---------------------------------------------------------------------------
// Asset Handlers
// ---------------------------------------------------------------------------

/// `POST /assets/register`
async fn register_asset_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterAssetRequest>,
) -> Result<Json<OpResponse<Address>>, ApiError> {
    state.host.apply("asset_register", |l| {
        l.treasury
            .assets_mut()
            .register_token(req.token, req.decimals)
    })?;
    Ok(OpResponse::new("asset_register", req.token))
}

/// `POST /assets/mint` - returns the recipient's new balance. The backed
/// token is only minted by the treasury against reserves.
async fn mint_asset_handler(
    State(state): State<AppState>,
    Json(req): Json<MintAssetRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    let backed = state.host.read(|l| l.treasury.state().config.backed_token);
    if req.token == backed {
        return Err(ApiError::Forbidden(format!(
            "{} is the backed token; mint it through a deposit",
            req.token
        )));
    }
    let balance = state.host.apply("asset_mint", |l| {
        let assets = l.treasury.assets_mut();
        assets.mint(&req.token, &req.to, req.amount)?;
        Ok::<_, HostError>(assets.balance_of(&req.token, &req.to))
    })?;
    Ok(OpResponse::new("asset_mint", balance))
}

/// `POST /assets/approve`
async fn approve_asset_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<OpResponse<Amount>>, ApiError> {
    state.host.apply("asset_approve", |l| {
        l.treasury
            .assets_mut()
            .approve(&req.token, &req.caller, &req.spender, req.amount)
    })?;
    Ok(OpResponse::new("asset_approve", req.amount))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
