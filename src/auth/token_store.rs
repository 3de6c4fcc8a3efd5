//! Single-use authorization codes and rotating refresh tokens (spec.md §3).
//!
//! Grounded in the teacher's `server::auth::mock` in-memory token bookkeeping
//! (a `Mutex`-guarded map keyed by opaque string, entries carrying an
//! expiry), generalized here to the two record shapes this spec requires
//! and with code consumption made atomic per spec.md §5 ("a single mutex
//! is sufficient given expected rates").

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;
use rand::RngCore;

/// Authorization code TTL ceiling (spec.md §3: "expiry (≤60 s)").
pub const AUTH_CODE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub subject: String,
    pub scope: String,
    pub state: Option<String>,
    pub expires_at: SystemTime,
}

impl AuthorizationCode {
    fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub client_id: String,
    pub subject: String,
    pub scope: String,
    pub expires_at: SystemTime,
}

impl RefreshToken {
    fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }
}

struct Inner {
    codes: HashMap<String, AuthorizationCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

pub struct TokenStore {
    inner: Mutex<Inner>,
    refresh_ttl: Duration,
}

fn random_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl TokenStore {
    pub fn new(refresh_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                codes: HashMap::new(),
                refresh_tokens: HashMap::new(),
            }),
            refresh_ttl,
        }
    }

    /// Mint a single-use authorization code bound to the given parameters
    /// (spec.md §4.7 POST `/oauth/login`).
    pub fn issue_code(
        &self,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        code_challenge: impl Into<String>,
        subject: impl Into<String>,
        scope: impl Into<String>,
        state: Option<String>,
    ) -> String {
        let code = random_opaque_token();
        let record = AuthorizationCode {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            code_challenge: code_challenge.into(),
            subject: subject.into(),
            scope: scope.into(),
            state,
            expires_at: SystemTime::now() + AUTH_CODE_TTL,
        };
        self.inner.lock().codes.insert(code.clone(), record);
        code
    }

    /// Atomically remove and return the code record, regardless of what
    /// the caller does with it afterward (spec.md §3: "consumption removes
    /// it even on PKCE failure").
    pub fn consume_code(&self, code: &str) -> Option<AuthorizationCode> {
        let record = self.inner.lock().codes.remove(code)?;
        if record.is_expired() {
            None
        } else {
            Some(record)
        }
    }

    /// Mint a refresh token for `client_id`/`subject`/`scope` (spec.md §4.7
    /// `grant_type=authorization_code` and the rotation step of
    /// `grant_type=refresh_token`).
    pub fn issue_refresh_token(
        &self,
        client_id: impl Into<String>,
        subject: impl Into<String>,
        scope: impl Into<String>,
    ) -> String {
        let token = random_opaque_token();
        let record = RefreshToken {
            client_id: client_id.into(),
            subject: subject.into(),
            scope: scope.into(),
            expires_at: SystemTime::now() + self.refresh_ttl,
        };
        self.inner.lock().refresh_tokens.insert(token.clone(), record);
        token
    }

    /// Rotate a refresh token: revoke the presented one and issue a fresh
    /// one bound to the same client/subject/scope. Returns `None` if the
    /// token is unknown, already rotated, or expired (spec.md §4.7:
    /// "Rotating an already-rotated (replayed) refresh token returns
    /// `invalid_grant`").
    pub fn rotate_refresh_token(&self, token: &str) -> Option<(RefreshToken, String)> {
        let record = {
            let mut inner = self.inner.lock();
            let record = inner.refresh_tokens.remove(token)?;
            if record.is_expired() {
                return None;
            }
            record
        };
        let new_token = self.issue_refresh_token(
            record.client_id.clone(),
            record.subject.clone(),
            record.scope.clone(),
        );
        Some((record, new_token))
    }
}
