//! Account command handlers.

use std::sync::Arc;

use baldosa_types::user::is_valid_email;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::password;
use crate::rpc::{parse_params, RpcError};
use crate::state::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Debug, Deserialize)]
struct CreateUserParams {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct EmailParams {
    email: String,
}

#[derive(Debug, Deserialize)]
struct GrantParams {
    email: String,
    amount: u64,
}

/// Create an account holding the configured signup coins.
pub async fn create_user(state: &Arc<DaemonState>, params: &Value) -> Result {
    let CreateUserParams { email, password } = parse_params(params)?;
    if !is_valid_email(&email) {
        return Err(RpcError::invalid_params("malformed email"));
    }
    if password.is_empty() {
        return Err(RpcError::invalid_params("password required"));
    }

    // Hashing blocks for a noticeable time; run it off the async workers.
    let hash = tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(|e| RpcError::internal_error(&e.to_string()))?
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;
    let user = state
        .ledger
        .create_user(&email, &hash, state.config.tiles.signup_coins)
        .await?;
    info!(email = %user.email, coins = user.coins, "user created");
    serde_json::to_value(&user).map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn get_user(state: &Arc<DaemonState>, params: &Value) -> Result {
    let EmailParams { email } = parse_params(params)?;
    let user = state.ledger.get_user(&email).await?;
    serde_json::to_value(&user).map_err(|e| RpcError::internal_error(&e.to_string()))
}

/// Administrative top-up.
pub async fn grant_coins(state: &Arc<DaemonState>, params: &Value) -> Result {
    let GrantParams { email, amount } = parse_params(params)?;
    let user = state.ledger.grant_coins(&email, amount).await?;
    info!(email = %user.email, amount, balance = user.coins, "coins granted");
    serde_json::to_value(&user).map_err(|e| RpcError::internal_error(&e.to_string()))
}
