//! Authorization-code + PKCE OAuth 2.1 endpoints (spec.md §4.7).
//!
//! Client and user registries follow the teacher's `MockValidator`
//! configuration shape (`server::auth::mock`) — small in-memory tables set
//! up once at startup — generalized into the two stores a real
//! authorization server needs: registered OAuth clients and a user/
//! credential table.

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::jwt::JwtIssuer;
use crate::auth::token_store::TokenStore;
use crate::tools::cursor::constant_time_eq;

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: String,
    pub scope: String,
}

/// OAuth 2.1 error-response shape (spec.md §4.7: "All errors follow OAuth
/// 2.1 error-response shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    pub fn new(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: error.into(),
            error_description: description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: String,
}

/// Outcome of validating an `/oauth/authorize` request.
pub enum AuthorizeOutcome {
    /// Render the login form, embedding the original query string.
    ShowLoginForm,
    /// Fail before a redirect is possible: respond 400 JSON.
    PreRedirectError(OAuthError),
    /// Fail after the redirect URI is known to be valid: redirect with
    /// `?error=&state=`.
    RedirectError { redirect_uri: String, error: OAuthError },
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub scope: String,
}

pub struct OAuthServer {
    clients: HashMap<String, OAuthClient>,
    users: HashMap<String, User>,
    tokens: TokenStore,
    jwt: JwtIssuer,
    access_ttl: Duration,
}

impl OAuthServer {
    pub fn new(clients: Vec<OAuthClient>, users: Vec<User>, jwt: JwtIssuer, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.client_id.clone(), c)).collect(),
            users: users.into_iter().map(|u| (u.username.clone(), u)).collect(),
            tokens: TokenStore::new(refresh_ttl),
            jwt,
            access_ttl,
        }
    }

    /// GET `/oauth/authorize` validation (spec.md §4.7).
    pub fn authorize(&self, params: &AuthorizeParams) -> AuthorizeOutcome {
        if params.response_type != "code" {
            return AuthorizeOutcome::PreRedirectError(OAuthError::new(
                "unsupported_response_type",
                Some("response_type must be \"code\"".to_string()),
            ));
        }

        let Some(client) = self.clients.get(&params.client_id) else {
            return AuthorizeOutcome::PreRedirectError(OAuthError::new("invalid_client", None));
        };

        // redirect_uri must match exactly before we trust it enough to
        // redirect errors through it.
        if client.redirect_uri != params.redirect_uri {
            return AuthorizeOutcome::PreRedirectError(OAuthError::new(
                "invalid_request",
                Some("redirect_uri does not match the registered value".to_string()),
            ));
        }

        if params.code_challenge_method != "S256" || params.code_challenge.is_empty() {
            return AuthorizeOutcome::RedirectError {
                redirect_uri: params.redirect_uri.clone(),
                error: OAuthError::new("invalid_request", Some("code_challenge (S256) is required".to_string())),
            };
        }

        if params.state.is_empty() {
            return AuthorizeOutcome::RedirectError {
                redirect_uri: params.redirect_uri.clone(),
                error: OAuthError::new("invalid_request", Some("state is required".to_string())),
            };
        }

        AuthorizeOutcome::ShowLoginForm
    }

    /// POST `/oauth/login` (spec.md §4.7).
    pub fn login(&self, params: &LoginParams) -> Result<(String, String), OAuthError> {
        let client = self
            .clients
            .get(&params.client_id)
            .ok_or_else(|| OAuthError::new("invalid_client", None))?;
        if client.redirect_uri != params.redirect_uri {
            return Err(OAuthError::new("invalid_request", Some("redirect_uri mismatch".to_string())));
        }

        let user = self.users.get(&params.username);
        let valid = user.map(|u| u.password == params.password).unwrap_or(false);
        if !valid {
            return Err(OAuthError::new("access_denied", Some("invalid credentials".to_string())));
        }
        let user = user.unwrap();

        let code = self.tokens.issue_code(
            &params.client_id,
            &params.redirect_uri,
            &params.code_challenge,
            &user.username,
            &user.scope,
            Some(params.state.clone()),
        );

        Ok((code, params.state.clone()))
    }

    /// POST `/oauth/token` with `grant_type=authorization_code` (spec.md §4.7).
    pub fn exchange_code(&self, code: &str, redirect_uri: &str, code_verifier: &str) -> Result<TokenResponse, OAuthError> {
        let record = self
            .tokens
            .consume_code(code)
            .ok_or_else(|| OAuthError::new("invalid_grant", None))?;

        // The code is already consumed; any failure from here on must not
        // re-credit it (spec.md §4.7).
        if record.redirect_uri != redirect_uri {
            return Err(OAuthError::new("invalid_grant", None));
        }

        let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        if !constant_time_eq(computed.as_bytes(), record.code_challenge.as_bytes()) {
            return Err(OAuthError::new("invalid_grant", None));
        }

        self.mint_tokens(&record.subject, &record.scope)
    }

    /// POST `/oauth/token` with `grant_type=refresh_token` (spec.md §4.7).
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        let (record, new_refresh) = self
            .tokens
            .rotate_refresh_token(refresh_token)
            .ok_or_else(|| OAuthError::new("invalid_grant", None))?;

        let access_token = self
            .jwt
            .issue(&record.subject, &record.scope)
            .map_err(|_| OAuthError::new("server_error", None))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.as_secs(),
            refresh_token: new_refresh,
            scope: record.scope,
        })
    }

    fn mint_tokens(&self, subject: &str, scope: &str) -> Result<TokenResponse, OAuthError> {
        let access_token = self.jwt.issue(subject, scope).map_err(|_| OAuthError::new("server_error", None))?;
        let refresh_token = self.tokens.issue_refresh_token(subject, subject, scope);
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl.as_secs(),
            refresh_token,
            scope: scope.to_string(),
        })
    }
}
