pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod live;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;
pub mod token;

pub use app::build_router;
pub use error::AppError;
pub use state::AppState;
