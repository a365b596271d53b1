use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::error::AppError;
use crate::handlers::ApiQuery;
use crate::live::DEFAULT_RECENT_STREAMS;
use crate::models::StreamSession;
use crate::state::AppState;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StreamsQuery {
    pub game_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStreamResponse {
    pub is_live: bool,
    pub stream: Option<StreamSession>,
}

#[derive(Serialize)]
pub struct RecentStreamsResponse {
    pub streams: Vec<StreamSession>,
}

// ?gameId=X answers "is X live", no gameId lists recent streams
pub async fn streams_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<StreamsQuery>,
) -> Result<Response, AppError> {
    let game_id = params.game_id.as_deref().map(str::trim).filter(|id| !id.is_empty());

    match game_id {
        Some(game_id) => {
            let stream = state.reader.get_active_stream_for_game(game_id).await?;
            Ok(Json(GameStreamResponse {
                is_live: stream.is_some(),
                stream,
            })
            .into_response())
        }
        None => {
            let limit = params.limit.unwrap_or(DEFAULT_RECENT_STREAMS);
            let streams = state.reader.list_recent_streams(limit).await?;
            Ok(Json(RecentStreamsResponse { streams }).into_response())
        }
    }
}
