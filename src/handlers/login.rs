use axum::{Json, extract::State};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use crate::error::AppError;
use crate::handlers::{ApiJson, ClientAddr};
use crate::state::AppState;

// a `username` field may be sent but is not checked; there is one admin password
#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

// Compare fixed-length digests so timing does not depend on the input
fn password_matches(expected: &str, supplied: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let supplied = Sha256::digest(supplied.as_bytes());
    expected
        .iter()
        .zip(supplied.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ClientAddr(client_addr): ClientAddr,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let expected = state.admin_password.as_deref().ok_or_else(|| {
        tracing::error!("login attempted but no admin password is configured");
        AppError::ServiceUnavailable("admin login is not configured".to_string())
    })?;

    // keyed on the address alone
    let decision = state.login_limiter.check(&client_addr);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            reset_in_ms: decision.reset_in_ms,
        });
    }

    if !password_matches(expected, &request.password) {
        tracing::warn!(%client_addr, remaining = decision.remaining, "failed admin login");
        return Err(AppError::Unauthorized {
            message: "invalid credentials".to_string(),
            remaining: decision.remaining,
        });
    }

    state.login_limiter.reset(&client_addr);
    tracing::info!(%client_addr, "admin login succeeded");
    Ok(Json(serde_json::json!({ "success": true })))
}
