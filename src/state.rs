use crate::live::LiveStateReader;
use crate::rate_limit::RateLimiter;
use crate::token::TokenIssuer;

// app's shared state
pub struct AppState {
    pub reader: LiveStateReader,
    pub issuer: TokenIssuer,
    pub login_limiter: RateLimiter, // guards the admin login endpoint
    pub admin_password: Option<String>,
}
