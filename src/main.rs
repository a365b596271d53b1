use anyhow::Context;
use chronicles_live::{
    AppState, build_router,
    cache::QueryCache,
    clock::{Clock, SystemClock},
    config::Args,
    live::{Collections, LiveStateReader},
    rate_limit::{InMemoryRateLimitStore, RateLimiter},
    store::{DocumentStore, firestore::FirestoreStore, memory::InMemoryDocumentStore},
    token::{BroadcasterGuard, TokenIssuer},
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chronicles_live=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_store(args: &Args) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if let Some(config) = args.firestore_config() {
        tracing::info!(project = %config.project_id, "using Firestore document store");
        return Ok(Arc::new(FirestoreStore::new(config)?));
    }

    let store = match &args.seed_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read seed file {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parse seed file {}", path.display()))?;
            InMemoryDocumentStore::from_json(&value)?
        }
        None => InMemoryDocumentStore::new(),
    };
    tracing::warn!("FIRESTORE_PROJECT_ID not set, serving from the in-memory document store");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_json);
    args.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let reader = LiveStateReader::new(
        build_store(&args)?,
        QueryCache::new(Duration::from_millis(args.cache_ttl_ms)),
        Collections {
            games: args.games_collection.clone(),
            streams: args.streams_collection.clone(),
        },
    );

    let credentials = args.relay_credentials();
    if credentials.is_none() {
        tracing::warn!("LIVEKIT_URL / LIVEKIT_API_KEY / LIVEKIT_API_SECRET incomplete, token requests will return 503");
    }
    let mut issuer = TokenIssuer::new(
        credentials,
        Duration::from_secs(args.token_ttl_secs),
        clock.clone(),
    );
    if args.single_broadcaster {
        issuer = issuer.with_broadcaster_guard(BroadcasterGuard::new(Duration::from_secs(
            args.broadcaster_lock_secs,
        )));
    }

    let login_limiter = RateLimiter::new(
        args.rate_limit_config(),
        Arc::new(InMemoryRateLimitStore::new()),
        clock,
    );

    if args.admin_password.is_none() {
        tracing::warn!("ADMIN_PASSWORD not set, admin login is disabled");
    }

    // creating shared state
    let state = Arc::new(AppState {
        reader,
        issuer,
        login_limiter,
        admin_password: args.admin_password.clone(),
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    tracing::info!(%addr, "chronicles-live listening");
    tracing::info!(
        max_attempts = args.rate_limit,
        window_secs = args.rate_window,
        "login rate limit"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await?;
    Ok(())
}
