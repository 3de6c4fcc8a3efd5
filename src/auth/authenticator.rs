//! Bearer validation and scope enforcement for protected routes (spec.md §4.8).

use crate::auth::jwt::JwtIssuer;
use crate::error::{Error, Result};

/// Scope required for a given JSON-RPC method (spec.md §4.8).
pub fn required_scope(method: &str) -> Option<&'static str> {
    match method {
        "tools/list" => Some("mcp:read"),
        "tools/call" => Some("mcp:write"),
        _ => None,
    }
}

/// Scope required for invoking a specific tool, in addition to the
/// method-level scope (spec.md §4.8: "tool-specific scope
/// `mcp:tool:<name>` may also be required").
pub fn tool_scope(tool_name: &str) -> String {
    format!("mcp:tool:{tool_name}")
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Whether `scopes` grants `required`, honoring the fixed inheritance
    /// chain `mcp:admin > mcp:write > mcp:read`. Tool-specific scopes
    /// (`mcp:tool:*`) do not inherit from anything (spec.md §4.8).
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes.iter().any(|granted| scope_satisfies(granted, required))
    }
}

fn scope_rank(scope: &str) -> Option<u8> {
    match scope {
        "mcp:admin" => Some(2),
        "mcp:write" => Some(1),
        "mcp:read" => Some(0),
        _ => None,
    }
}

fn scope_satisfies(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    match (scope_rank(granted), scope_rank(required)) {
        (Some(g), Some(r)) => g >= r,
        _ => false,
    }
}

pub struct Authenticator {
    jwt: JwtIssuer,
}

impl Authenticator {
    pub fn new(jwt: JwtIssuer) -> Self {
        Self { jwt }
    }

    /// Parse an `Authorization: Bearer <token>` header value and produce
    /// an [`AuthContext`].
    pub fn authenticate(&self, authorization_header: Option<&str>) -> Result<AuthContext> {
        let header = authorization_header.ok_or_else(|| Error::authorization("missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::authorization("Authorization header must use the Bearer scheme"))?;

        let claims = self.jwt.verify(token)?;
        let scopes = claims.scope.split_whitespace().map(str::to_string).collect();
        Ok(AuthContext { subject: claims.sub, scopes })
    }

    /// Enforce that `context` carries `required`, if any.
    pub fn require_scope(&self, context: &AuthContext, required: Option<&str>) -> Result<()> {
        match required {
            None => Ok(()),
            Some(scope) if context.has_scope(scope) => Ok(()),
            Some(scope) => Err(Error::authorization(format!("missing required scope: {scope}"))),
        }
    }
}
