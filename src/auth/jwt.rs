//! Symmetric JWT issuance and verification (spec.md §3, §4.8).
//!
//! The teacher's `server::auth::jwt::JwtValidator` is a JWKS-fetching,
//! asymmetric-key validator built around the `jwt-auth` feature flag; this
//! spec only needs a single symmetric secret, so this module keeps the
//! teacher's claims/error shape (`jsonwebtoken`, `Error`/`ErrorCode`) but
//! drops the JWKS cache in favor of `EncodingKey`/`DecodingKey::from_secret`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorCode, Result};

/// Clock-skew tolerance when verifying `exp`/`iat` (spec.md §4.8: "≤60 s").
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: String,
}

#[derive(Clone)]
pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, audience: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
        }
    }

    /// Mint an access JWT for `subject`/`scope` (spec.md §3: `exp - iat`
    /// matches the configured TTL, `jti` unique per issuance).
    pub fn issue(&self, subject: &str, scope: &str) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let iat = now.as_secs() as i64;
        let exp = iat + self.ttl.as_secs() as i64;
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: self.audience.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(Error::from)
    }

    /// Verify signature and `iss`/`aud`/`exp` claims with clock-skew
    /// tolerance (spec.md §4.8).
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.set_audience(&[self.audience.clone()]);
        validation.leeway = CLOCK_SKEW_TOLERANCE.as_secs();

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| Error::authorization("invalid or expired token"))?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// JSON-RPC error code to report when bearer validation fails.
pub const BEARER_VALIDATION_CODE: ErrorCode = ErrorCode::INVALID_REQUEST;
