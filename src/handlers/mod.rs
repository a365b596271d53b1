mod client;
mod extract;
mod games;
mod health;
mod login;
mod metrics;
mod streams;
mod token;

pub use client::ClientAddr;
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use games::live_games_handler;
pub use health::health_handler;
pub use login::login_handler;
pub use metrics::metrics_handler;
pub use streams::streams_handler;
pub use token::token_handler;
