use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use crate::error::AppError;
use crate::models::GameLiveStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct LiveGamesResponse {
    pub games: Vec<GameLiveStatus>,
    pub total: usize,
}

pub async fn live_games_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LiveGamesResponse>, AppError> {
    let games = state.reader.list_active_games().await?;
    Ok(Json(LiveGamesResponse {
        total: games.len(),
        games,
    }))
}
