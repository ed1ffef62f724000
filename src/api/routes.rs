use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::auth::{AuthUser, create_token, hash_password, verify_password};
use crate::api::ws::ws_handler;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::notify::EventSender;
use crate::store::Credential;
use crate::types::position::{Position, Price, PositionId, Qty};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub events: EventSender,
    pub jwt_secret: String,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/signup", post(signup))
        .route("/api/login", post(login))
        .route("/api/balance", get(get_balance))
        .route("/api/reset", post(reset_account))
        .route("/api/position/buy", post(place_buy))
        .route("/api/position/sell", post(place_sell))
        .route("/api/position", get(list_positions))
        .route("/api/position/executed", get(list_executed))
        .route("/api/position/history", get(list_history))
        .route("/api/position/{id}", patch(modify_order).delete(cancel_order))
        .with_state(state)
}

async fn health() -> &'static str {
    "healthy"
}

// --- errors ---

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Unauthorized,
    UsernameTaken,
    BadCredentials,
    Internal,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Engine(err) => {
                let status = match err {
                    EngineError::Validation(_)
                    | EngineError::InsufficientQuantity { .. }
                    | EngineError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
                    EngineError::NoMatchingHolding { .. }
                    | EngineError::PositionNotFound
                    | EngineError::AccountNotFound => StatusCode::NOT_FOUND,
                    EngineError::InvalidState => StatusCode::CONFLICT,
                    EngineError::PriceUnavailable { .. } | EngineError::ConcurrencyConflict => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                (status, err.to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::UsernameTaken => (StatusCode::CONFLICT, "username already taken".to_string()),
            ApiError::BadCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid username or password".to_string())
            }
            ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

// --- auth handlers ---

#[derive(Deserialize)]
struct AuthRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    success: bool,
    token: String,
    user_id: Uuid,
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = req.username.trim().to_lowercase();
    if username.is_empty() || req.password.len() < 6 {
        return Err(ApiError::Engine(EngineError::Validation(
            "username and a password of at least 6 characters are required".to_string(),
        )));
    }
    let user_id = Uuid::new_v4();
    let password_hash = hash_password(&req.password).map_err(|_| ApiError::Internal)?;
    {
        let mut book = state.engine.book().write().await;
        let registered = book.register(
            Credential {
                user_id,
                username,
                password_hash,
            },
            state.engine.starting_balance(),
        );
        if !registered {
            return Err(ApiError::UsernameTaken);
        }
    }
    let token = create_token(state.jwt_secret.as_bytes(), user_id).map_err(|_| ApiError::Internal)?;
    Ok(Json(TokenResponse {
        success: true,
        token,
        user_id,
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = req.username.trim().to_lowercase();
    let (user_id, password_hash) = {
        let book = state.engine.book().read().await;
        let cred = book.credential(&username).ok_or(ApiError::BadCredentials)?;
        (cred.user_id, cred.password_hash.clone())
    };
    if !verify_password(&req.password, &password_hash) {
        return Err(ApiError::BadCredentials);
    }
    let token = create_token(state.jwt_secret.as_bytes(), user_id).map_err(|_| ApiError::Internal)?;
    Ok(Json(TokenResponse {
        success: true,
        token,
        user_id,
    }))
}

// --- order handlers ---

/// Prices are minor currency units (9500 = 95.00), matching the engine.
#[derive(Deserialize)]
struct OrderRequest {
    symbol: String,
    price: Price,
    quantity: Qty,
}

#[derive(Deserialize)]
struct ModifyRequest {
    price: Price,
    quantity: Qty,
}

#[derive(Serialize)]
struct PositionResponse {
    success: bool,
    position: Position,
}

async fn place_buy(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<OrderRequest>,
) -> Result<Json<PositionResponse>, ApiError> {
    let position = state
        .engine
        .place_buy(user.user_id, &req.symbol, req.price, req.quantity)
        .await?;
    Ok(Json(PositionResponse {
        success: true,
        position,
    }))
}

async fn place_sell(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<OrderRequest>,
) -> Result<Json<PositionResponse>, ApiError> {
    let position = state
        .engine
        .place_sell(user.user_id, &req.symbol, req.price, req.quantity)
        .await?;
    Ok(Json(PositionResponse {
        success: true,
        position,
    }))
}

async fn modify_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PositionId>,
    Json(req): Json<ModifyRequest>,
) -> Result<Json<PositionResponse>, ApiError> {
    let position = state
        .engine
        .modify_order(user.user_id, id, req.price, req.quantity)
        .await?;
    Ok(Json(PositionResponse {
        success: true,
        position,
    }))
}

async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<PositionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.engine.cancel_order(user.user_id, id).await?;
    Ok(Json(json!({ "success": true, "message": "order cancelled" })))
}

async fn list_positions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<serde_json::Value> {
    let positions = state.engine.list_positions(user.user_id).await;
    Json(json!({ "positions": positions }))
}

async fn list_executed(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<serde_json::Value> {
    let positions = state.engine.list_executed_or_closed(user.user_id).await;
    Json(json!({ "positions": positions }))
}

async fn list_history(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let history = state.engine.list_history(user.user_id).await;
    Json(json!({ "history": history }))
}

async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let balance = state.engine.balance(user.user_id).await?;
    Ok(Json(json!({ "balance": balance })))
}

async fn reset_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let balance = state.engine.reset_account(user.user_id).await?;
    Ok(Json(json!({ "success": true, "balance": balance })))
}
