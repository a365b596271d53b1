use crate::rate_limit::RateLimitConfig;
use crate::store::firestore::{DEFAULT_BASE_URL, FirestoreConfig};
use crate::token::RelayCredentials;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure; deployment values and secrets also come from env
#[derive(Parser, Debug, Clone)]
#[command(name = "chronicles-live")]
#[command(about = "Live game state, room tokens and login throttling for The PPSU Chronicles")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Max login attempts per client per window
    #[arg(long, default_value_t = 5)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 900)]
    pub rate_window: u64,

    // Tracked client count that triggers a sweep of expired entries
    #[arg(long, default_value_t = 10_000)]
    pub rate_limit_sweep_threshold: usize,

    // Media relay websocket URL handed to clients
    #[arg(long, env = "LIVEKIT_URL")]
    pub livekit_url: Option<String>,

    #[arg(long, env = "LIVEKIT_API_KEY", hide_env_values = true)]
    pub livekit_api_key: Option<String>,

    #[arg(long, env = "LIVEKIT_API_SECRET", hide_env_values = true)]
    pub livekit_api_secret: Option<String>,

    // Room token lifetime in seconds
    #[arg(long, default_value_t = 6 * 60 * 60)]
    pub token_ttl_secs: u64,

    // Refuse a second broadcaster token for a room inside the lock window
    #[arg(long, default_value_t = false)]
    pub single_broadcaster: bool,

    #[arg(long, default_value_t = 300)]
    pub broadcaster_lock_secs: u64,

    // Firestore project; in-memory store when unset
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub firestore_project: Option<String>,

    #[arg(long, default_value = "(default)")]
    pub firestore_database: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub firestore_base_url: String,

    #[arg(long, env = "FIRESTORE_TOKEN", hide_env_values = true)]
    pub firestore_token: Option<String>,

    // Store request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub store_timeout: u64,

    // JSON fixtures for the in-memory store
    #[arg(long)]
    pub seed_file: Option<PathBuf>,

    #[arg(long, default_value = "basketball_games")]
    pub games_collection: String,

    #[arg(long, default_value = "live_streams")]
    pub streams_collection: String,

    // Query cache TTL in milliseconds, 0 disables
    #[arg(long, default_value_t = 2000)]
    pub cache_ttl_ms: u64,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    // Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.rate_limit >= 1, "--rate-limit must be at least 1");
        anyhow::ensure!(self.rate_window > 0, "--rate-window must be positive");
        anyhow::ensure!(self.token_ttl_secs > 0, "--token-ttl-secs must be positive");
        anyhow::ensure!(self.store_timeout > 0, "--store-timeout must be positive");
        Ok(())
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_attempts: self.rate_limit,
            window: Duration::from_secs(self.rate_window),
            sweep_threshold: self.rate_limit_sweep_threshold,
        }
    }

    // all three relay settings or nothing
    pub fn relay_credentials(&self) -> Option<RelayCredentials> {
        let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Some(RelayCredentials {
            url: present(&self.livekit_url)?,
            api_key: present(&self.livekit_api_key)?,
            api_secret: present(&self.livekit_api_secret)?,
        })
    }

    pub fn firestore_config(&self) -> Option<FirestoreConfig> {
        let project_id = self.firestore_project.as_deref().filter(|p| !p.trim().is_empty())?;
        Some(FirestoreConfig {
            project_id: project_id.to_string(),
            database: self.firestore_database.clone(),
            base_url: self.firestore_base_url.clone(),
            bearer_token: self.firestore_token.clone(),
            timeout: Duration::from_secs(self.store_timeout),
        })
    }
}
