use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use crate::handlers;
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::state::AppState;

async fn track_request(request: Request, next: Next) -> Response {
    REQUEST_TOTAL.inc();
    let start_time = Instant::now();
    let response = next.run(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/basketball/games/live", get(handlers::live_games_handler))
        .route("/api/basketball/streams", get(handlers::streams_handler))
        .route("/api/basketball/token/{game_id}", get(handlers::token_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        .layer(middleware::from_fn(track_request));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
