//! HTTP routes around the broadcaster: account balances, deposits that
//! publish balance updates, health, and the WebSocket subscribe endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::account::{Balance, BalanceUpdate, Ledger, parse_deposit};
use crate::broker::Broker;
use crate::transport::websocket::{subscribe_default, subscribe_topic};
use crate::utils::error::{ApiError, AppError};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub ledger: Ledger,
    pub default_account: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(broker: Arc<Broker>, ledger: Ledger, default_account: impl Into<String>) -> Self {
        Self {
            broker,
            ledger,
            default_account: default_account.into(),
            started_at: Utc::now(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Builds the router. `allowed_origin` is the single origin CORS admits.
pub fn create_router(state: Arc<AppState>, allowed_origin: &str) -> Result<Router, AppError> {
    let origin = HeaderValue::from_str(allowed_origin)
        .map_err(|_| AppError::InvalidOrigin(allowed_origin.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Ok(Router::new()
        .route("/balance", get(default_balance))
        .route("/deposit/{deposit}", post(default_deposit))
        .route("/account/{account_id}/balance", get(account_balance))
        .route("/account/{account_id}/deposit/{deposit}", post(account_deposit))
        .route("/subscribe", get(subscribe_default))
        .route("/subscribe/{topic}", get(subscribe_topic))
        .route("/ws", get(subscribe_default))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn default_balance(State(state): State<Arc<AppState>>) -> Json<Balance> {
    Json(Balance {
        balance: state.ledger.balance(&state.default_account),
    })
}

async fn account_balance(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Json<Balance> {
    Json(Balance {
        balance: state.ledger.balance(&account_id),
    })
}

async fn default_deposit(
    State(state): State<Arc<AppState>>,
    Path(deposit): Path<String>,
) -> Result<Json<Balance>, ApiError> {
    deposit_into(&state, &state.default_account, &deposit).await
}

async fn account_deposit(
    State(state): State<Arc<AppState>>,
    Path((account_id, deposit)): Path<(String, String)>,
) -> Result<Json<Balance>, ApiError> {
    deposit_into(&state, &account_id, &deposit).await
}

/// Applies the deposit, then announces the new balance on the account's
/// topic. The publish may wait on the shared rate limiter, and still goes out
/// if the client disconnects meanwhile.
async fn deposit_into(
    state: &AppState,
    account_id: &str,
    raw: &str,
) -> Result<Json<Balance>, ApiError> {
    let amount = parse_deposit(raw).inspect_err(|e| warn!("failed to parse deposit: {e}"))?;
    let balance = state
        .ledger
        .deposit(account_id, amount)
        .inspect_err(|e| warn!("deposit rejected: {e}"))?;
    debug!(account_id, amount, balance, "deposit applied");

    let update = BalanceUpdate {
        account_id: account_id.to_string(),
        balance,
    };
    match update.to_payload() {
        Ok(payload) => {
            if let Err(e) = state.broker.spawn_publish(account_id, payload).await {
                warn!(account_id, "balance update publish failed: {e}");
            }
        }
        Err(e) => warn!(account_id, "failed to encode balance update: {e}"),
    }

    Ok(Json(Balance { balance }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "status": "ok",
        "topics": state.broker.topic_count(),
        "subscribers": state.broker.total_subscribers(),
        "uptime_secs": uptime,
    }))
}
