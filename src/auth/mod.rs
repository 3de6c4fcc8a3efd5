//! Authorization subsystem: OAuth 2.1 server, bearer authenticator, JWTs.

pub mod authenticator;
pub mod jwt;
pub mod oauth;
pub mod promise_lock;
pub mod token_store;

pub use authenticator::{AuthContext, Authenticator};
pub use jwt::JwtIssuer;
pub use oauth::OAuthServer;
