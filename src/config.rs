//! Process configuration: environment variables and CLI flags (spec.md §6).

use clap::Parser;
use std::time::Duration;

/// Which transport(s) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lower")]
pub enum TransportMode {
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "agent-protocol-server", version, about)]
pub struct Config {
    /// MCP_TRANSPORT — which transport(s) to run.
    #[arg(long = "transport", env = "MCP_TRANSPORT", default_value = "stdio")]
    pub transport: TransportMode,

    /// MCP_PORT
    #[arg(long, env = "MCP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// MCP_HOST
    #[arg(long, env = "MCP_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// MCP_SHUTDOWN_TIMEOUT_MS
    #[arg(long, env = "MCP_SHUTDOWN_TIMEOUT_MS", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// MCP_ALLOWED_ORIGINS (comma-separated)
    #[arg(long, env = "MCP_ALLOWED_ORIGINS", default_value = "")]
    pub allowed_origins: String,

    /// MCP_CURSOR_SECRET
    #[arg(long, env = "MCP_CURSOR_SECRET", default_value = "dev-cursor-secret")]
    pub cursor_secret: String,

    /// OAUTH_SIGNING_SECRET
    #[arg(long, env = "OAUTH_SIGNING_SECRET", default_value = "dev-signing-secret")]
    pub oauth_signing_secret: String,

    /// OAUTH_ACCESS_TOKEN_TTL (seconds)
    #[arg(long, env = "OAUTH_ACCESS_TOKEN_TTL", default_value_t = 3600)]
    pub oauth_access_token_ttl: u64,

    /// OAUTH_REFRESH_TOKEN_TTL (seconds)
    #[arg(long, env = "OAUTH_REFRESH_TOKEN_TTL", default_value_t = 1_209_600)]
    pub oauth_refresh_token_ttl: u64,

    /// OAUTH_ISSUER
    #[arg(long, env = "OAUTH_ISSUER", default_value = "https://localhost")]
    pub oauth_issuer: String,

    /// OAUTH_TEST_USER
    #[arg(long, env = "OAUTH_TEST_USER", default_value = "demo")]
    pub oauth_test_user: String,

    /// OAUTH_TEST_PASSWORD
    #[arg(long, env = "OAUTH_TEST_PASSWORD", default_value = "demo")]
    pub oauth_test_password: String,

    /// AUTH_ENABLED — `false` disables the Authenticator for dev.
    #[arg(long, env = "AUTH_ENABLED", default_value_t = true)]
    pub auth_enabled: bool,

    /// MCP_STATELESS — every request must embed all state; no session is
    /// created and `GET /mcp` is disabled (spec.md §4.4).
    #[arg(long, env = "MCP_STATELESS", default_value_t = false)]
    pub stateless: bool,
}

impl Config {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn oauth_access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_access_token_ttl)
    }

    pub fn oauth_refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_refresh_token_ttl)
    }

    /// Parsed allow-list. An empty list means no origin is allowed except
    /// same-origin; `*` (only meaningful in dev) allows everything.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
