// HS256 room tokens in the relay's claim format; nothing is stored on issuance
use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics::TOKENS_ISSUED;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ROOM_PREFIX: &str = "basketball-game-";
pub const BROADCASTER_IDENTITY: &str = "admin-broadcaster";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const VIEWER_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Broadcaster,
    Viewer,
}

impl Role {
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        match raw {
            "broadcaster" => Ok(Role::Broadcaster),
            "viewer" => Ok(Role::Viewer),
            other => Err(TokenError::InvalidRole(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Broadcaster => "broadcaster",
            Role::Viewer => "viewer",
        }
    }

    pub fn grant(&self, room: &str) -> VideoGrant {
        match self {
            Role::Broadcaster => VideoGrant {
                room: room.to_string(),
                room_join: true,
                room_create: true,
                can_publish: true,
                can_subscribe: false,
            },
            Role::Viewer => VideoGrant {
                room: room.to_string(),
                room_join: true,
                room_create: false,
                can_publish: false,
                can_subscribe: true,
            },
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub room_create: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayClaims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub name: String,
    pub nbf: u64,
    pub iat: u64,
    pub exp: u64,
    pub video: VideoGrant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSessionGrant {
    pub room_name: String,
    pub identity: String,
    pub role: Role,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub url: String,
    pub room_name: String,
    #[serde(skip)]
    pub grant: LiveSessionGrant,
}

#[derive(Clone)]
pub struct RelayCredentials {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid role {0:?}: expected \"broadcaster\" or \"viewer\"")]
    InvalidRole(String),
    #[error("game id must not be empty")]
    EmptyGameId,
    #[error("live streaming is not configured")]
    NotConfigured,
    #[error("a broadcaster is already live in room {0}")]
    BroadcasterActive(String),
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidRole(_) | TokenError::EmptyGameId => {
                AppError::InvalidInput(err.to_string())
            }
            TokenError::NotConfigured => AppError::ServiceUnavailable(err.to_string()),
            TokenError::BroadcasterActive(_) => AppError::Conflict(err.to_string()),
            TokenError::Signing(_) => AppError::Internal("failed to generate token".to_string()),
        }
    }
}

pub fn room_name(game_id: &str) -> String {
    format!("{ROOM_PREFIX}{game_id}")
}

fn viewer_identity(now_ms: u64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VIEWER_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("viewer-{now_ms}-{suffix}")
}

// refuses a second broadcaster token for a room inside the lock window
pub struct BroadcasterGuard {
    lock: Duration,
    issued: DashMap<String, u64>,
}

impl BroadcasterGuard {
    pub fn new(lock: Duration) -> Self {
        Self {
            lock,
            issued: DashMap::new(),
        }
    }

    fn claim(&self, room: &str, now_ms: u64) -> Result<(), TokenError> {
        let lock_ms = self.lock.as_millis() as u64;
        // expired locks are dropped here so the table tracks live rooms only
        self.issued
            .retain(|_, issued_at| now_ms.saturating_sub(*issued_at) < lock_ms);
        match self.issued.entry(room.to_string()) {
            Entry::Occupied(_) => Err(TokenError::BroadcasterActive(room.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(now_ms);
                Ok(())
            }
        }
    }

    pub fn release(&self, room: &str) {
        self.issued.remove(room);
    }

    pub fn locked_rooms(&self) -> usize {
        self.issued.len()
    }
}

pub struct TokenIssuer {
    credentials: Option<RelayCredentials>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    guard: Option<BroadcasterGuard>,
}

impl TokenIssuer {
    pub fn new(credentials: Option<RelayCredentials>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            credentials,
            ttl,
            clock,
            guard: None,
        }
    }

    pub fn with_broadcaster_guard(mut self, guard: BroadcasterGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn guard(&self) -> Option<&BroadcasterGuard> {
        self.guard.as_ref()
    }

    pub fn issue(&self, game_id: &str, role: &str) -> Result<IssuedToken, TokenError> {
        let role = Role::parse(role)?;
        let game_id = game_id.trim();
        if game_id.is_empty() {
            return Err(TokenError::EmptyGameId);
        }
        let credentials = self.credentials.as_ref().ok_or(TokenError::NotConfigured)?;

        let room = room_name(game_id);
        let now_ms = self.clock.now_ms();

        let identity = match role {
            Role::Broadcaster => BROADCASTER_IDENTITY.to_string(),
            Role::Viewer => viewer_identity(now_ms),
        };
        let video = role.grant(&room);
        let now_secs = now_ms / 1000;
        let exp = now_secs + self.ttl.as_secs();
        let claims = RelayClaims {
            iss: credentials.api_key.clone(),
            sub: identity.clone(),
            jti: identity.clone(),
            name: identity.clone(),
            nbf: now_secs,
            iat: now_secs,
            exp,
            video: video.clone(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(credentials.api_secret.as_bytes()),
        )?;

        // lock the room only once there is a token to hand out
        if role == Role::Broadcaster {
            if let Some(guard) = &self.guard {
                guard.claim(&room, now_ms)?;
            }
        }

        TOKENS_ISSUED.with_label_values(&[role.as_str()]).inc();
        tracing::info!(%room, %role, %identity, "issued live room token");

        Ok(IssuedToken {
            token,
            url: credentials.url.clone(),
            room_name: room.clone(),
            grant: LiveSessionGrant {
                room_name: room,
                identity,
                role,
                can_publish: video.can_publish,
                can_subscribe: video.can_subscribe,
                expires_at_ms: exp * 1000,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use jsonwebtoken::{DecodingKey, Validation};

    const NOW_MS: u64 = 1_772_380_800_000;

    fn credentials() -> RelayCredentials {
        RelayCredentials {
            url: "wss://relay.example.test".into(),
            api_key: "APIkey123".into(),
            api_secret: "a-very-secret-signing-secret-value".into(),
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            Some(credentials()),
            DEFAULT_TOKEN_TTL,
            Arc::new(ManualClock::new(NOW_MS)),
        )
    }

    fn decode(token: &str) -> RelayClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        // the manual clock sits in the past relative to the test host
        validation.validate_exp = false;
        validation.validate_nbf = false;
        jsonwebtoken::decode::<RelayClaims>(
            token,
            &DecodingKey::from_secret(credentials().api_secret.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn viewer_token_for_game42() {
        let issued = issuer().issue("game42", "viewer").unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issued.url, "wss://relay.example.test");
        assert_eq!(issued.room_name, "basketball-game-game42");
    }

    #[test]
    fn role_permissions_are_exclusive() {
        let issuer = issuer();
        let broadcaster = issuer.issue("g1", "broadcaster").unwrap();
        assert!(broadcaster.grant.can_publish);
        assert!(!broadcaster.grant.can_subscribe);
        let claims = decode(&broadcaster.token);
        assert_eq!(claims.video, Role::Broadcaster.grant("basketball-game-g1"));
        assert!(claims.video.room_create && claims.video.room_join);
        assert!(claims.video.can_publish && !claims.video.can_subscribe);
        assert_eq!(claims.sub, BROADCASTER_IDENTITY);

        let viewer = issuer.issue("g1", "viewer").unwrap();
        assert!(!viewer.grant.can_publish);
        assert!(viewer.grant.can_subscribe);
        let claims = decode(&viewer.token);
        assert!(!claims.video.room_create && claims.video.room_join);
        assert!(!claims.video.can_publish && claims.video.can_subscribe);
    }

    #[test]
    fn grants_never_overlap() {
        for role in [Role::Broadcaster, Role::Viewer] {
            let grant = role.grant("r");
            assert_ne!(grant.can_publish, grant.can_subscribe, "{role}");
        }
    }

    #[test]
    fn unknown_roles_mint_nothing() {
        let issuer = issuer();
        for role in ["", "admin", "Viewer", "BROADCASTER", "viewer ", "publisher"] {
            let err = issuer.issue("g1", role).unwrap_err();
            assert!(matches!(err, TokenError::InvalidRole(_)), "{role:?}");
            assert!(matches!(AppError::from(err), AppError::InvalidInput(_)));
        }
    }

    #[test]
    fn viewers_get_distinct_identities() {
        let issuer = issuer();
        let a = issuer.issue("g1", "viewer").unwrap().grant.identity;
        let b = issuer.issue("g1", "viewer").unwrap().grant.identity;
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("viewer-{NOW_MS}-")));
        assert_eq!(a.len(), format!("viewer-{NOW_MS}-").len() + VIEWER_SUFFIX_LEN);
    }

    #[test]
    fn room_depends_only_on_game() {
        let issuer = issuer();
        let rooms: Vec<String> = ["broadcaster", "viewer", "viewer"]
            .iter()
            .map(|role| issuer.issue("final-2026", role).unwrap().room_name)
            .collect();
        assert!(rooms.iter().all(|r| r == "basketball-game-final-2026"));
        assert_ne!(room_name("a"), room_name("b"));
    }

    #[test]
    fn expiry_is_issue_time_plus_ttl() {
        let issued = issuer().issue("g1", "viewer").unwrap();
        let claims = decode(&issued.token);
        assert_eq!(claims.iat, NOW_MS / 1000);
        assert_eq!(claims.exp, NOW_MS / 1000 + 6 * 60 * 60);
        assert_eq!(claims.iss, "APIkey123");
        assert_eq!(issued.grant.expires_at_ms, claims.exp * 1000);
    }

    #[test]
    fn missing_credentials_is_unavailable() {
        let issuer = TokenIssuer::new(None, DEFAULT_TOKEN_TTL, Arc::new(ManualClock::new(NOW_MS)));
        let err = issuer.issue("g1", "viewer").unwrap_err();
        assert!(matches!(err, TokenError::NotConfigured));
        assert!(matches!(AppError::from(err), AppError::ServiceUnavailable(_)));
        // role is validated first
        assert!(matches!(
            issuer.issue("g1", "nobody").unwrap_err(),
            TokenError::InvalidRole(_)
        ));
    }

    #[test]
    fn blank_game_id_is_rejected() {
        assert!(matches!(
            issuer().issue("  ", "viewer").unwrap_err(),
            TokenError::EmptyGameId
        ));
    }

    #[test]
    fn concurrent_broadcasters_allowed_without_guard() {
        let issuer = issuer();
        assert!(issuer.issue("g1", "broadcaster").is_ok());
        assert!(issuer.issue("g1", "broadcaster").is_ok());
    }

    #[test]
    fn guard_blocks_second_broadcaster_until_lock_expires() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let issuer = TokenIssuer::new(Some(credentials()), DEFAULT_TOKEN_TTL, clock.clone())
            .with_broadcaster_guard(BroadcasterGuard::new(Duration::from_secs(300)));

        assert!(issuer.issue("g1", "broadcaster").is_ok());
        let err = issuer.issue("g1", "broadcaster").unwrap_err();
        assert!(matches!(err, TokenError::BroadcasterActive(_)));
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));

        // other rooms and viewers are unaffected
        assert!(issuer.issue("g2", "broadcaster").is_ok());
        assert!(issuer.issue("g1", "viewer").is_ok());

        clock.advance_ms(300_000);
        assert!(issuer.issue("g1", "broadcaster").is_ok());

        issuer.guard().unwrap().release("basketball-game-g1");
        assert!(issuer.issue("g1", "broadcaster").is_ok());
    }

    #[test]
    fn failed_issuance_leaves_room_unlocked() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let unconfigured = TokenIssuer::new(None, DEFAULT_TOKEN_TTL, clock.clone())
            .with_broadcaster_guard(BroadcasterGuard::new(Duration::from_secs(300)));
        assert!(matches!(
            unconfigured.issue("g1", "broadcaster"),
            Err(TokenError::NotConfigured)
        ));
        assert_eq!(unconfigured.guard().unwrap().locked_rooms(), 0);

        let issuer = TokenIssuer::new(Some(credentials()), DEFAULT_TOKEN_TTL, clock)
            .with_broadcaster_guard(BroadcasterGuard::new(Duration::from_secs(300)));
        assert!(issuer.issue(" ", "broadcaster").is_err());
        assert!(issuer.issue("g1", "publisher").is_err());
        assert_eq!(issuer.guard().unwrap().locked_rooms(), 0);
        assert!(issuer.issue("g1", "broadcaster").is_ok());
        assert_eq!(issuer.guard().unwrap().locked_rooms(), 1);
    }

    #[test]
    fn expired_room_locks_are_pruned() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let issuer = TokenIssuer::new(Some(credentials()), DEFAULT_TOKEN_TTL, clock.clone())
            .with_broadcaster_guard(BroadcasterGuard::new(Duration::from_secs(300)));
        for game in ["g1", "g2", "g3"] {
            assert!(issuer.issue(game, "broadcaster").is_ok());
        }
        assert_eq!(issuer.guard().unwrap().locked_rooms(), 3);

        clock.advance_ms(300_000);
        assert!(issuer.issue("g4", "broadcaster").is_ok());
        assert_eq!(issuer.guard().unwrap().locked_rooms(), 1);
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("a-very-secret"));
    }
}
