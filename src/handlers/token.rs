use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;
use crate::error::AppError;
use crate::handlers::{ApiPath, ApiQuery};
use crate::state::AppState;
use crate::token::{IssuedToken, TokenError};

#[derive(Deserialize)]
pub struct TokenQuery {
    pub role: Option<String>,
}

pub async fn token_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(game_id): ApiPath<String>,
    ApiQuery(params): ApiQuery<TokenQuery>,
) -> Result<Json<IssuedToken>, AppError> {
    let role = params.role.unwrap_or_default();

    state.issuer.issue(&game_id, &role).map(Json).map_err(|err| {
        match &err {
            TokenError::Signing(_) | TokenError::NotConfigured => {
                tracing::error!(%game_id, %role, error = %err, "live token issuance failed")
            }
            _ => tracing::warn!(%game_id, %role, error = %err, "live token request refused"),
        }
        AppError::from(err)
    })
}
