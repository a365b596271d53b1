#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use chronicles_live::{
    AppState,
    cache::QueryCache,
    clock::ManualClock,
    live::{Collections, LiveStateReader},
    rate_limit::{InMemoryRateLimitStore, RateLimitConfig, RateLimiter},
    store::memory::InMemoryDocumentStore,
    token::{RelayCredentials, TokenIssuer},
};
use std::sync::Arc;
use std::time::Duration;

pub const NOW_MS: u64 = 1_772_380_800_000;
pub const RELAY_URL: &str = "wss://relay.example.test";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub router: axum::Router,
    pub store: Arc<InMemoryDocumentStore>,
    pub clock: Arc<ManualClock>,
}

pub fn credentials() -> RelayCredentials {
    RelayCredentials {
        url: RELAY_URL.to_string(),
        api_key: "APItest".to_string(),
        api_secret: "integration-test-signing-secret".to_string(),
    }
}

pub fn test_app(relay: Option<RelayCredentials>) -> TestApp {
    let store = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let state = AppState {
        reader: LiveStateReader::new(
            store.clone(),
            QueryCache::new(Duration::ZERO),
            Collections::default(),
        ),
        issuer: TokenIssuer::new(relay, Duration::from_secs(6 * 60 * 60), clock.clone()),
        login_limiter: RateLimiter::new(
            RateLimitConfig::default(),
            Arc::new(InMemoryRateLimitStore::new()),
            clock.clone(),
        ),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
    };
    TestApp {
        router: chronicles_live::build_router(Arc::new(state)),
        store,
        clock,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

pub fn login_request(addr: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", addr)
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
