//! Binary entry point: parse configuration, wire every component together,
//! and run the transport(s) selected by `MCP_TRANSPORT` (spec.md §6).
//!
//! Wiring follows the teacher's `StreamableHttpServer::start`: bind a
//! `TcpListener`, hand the router to `axum::serve` inside a spawned task,
//! and let the signal handler drive shutdown from the outside.

use std::sync::Arc;

use agent_protocol_server::auth::oauth::{OAuthClient, OAuthServer, User};
use agent_protocol_server::auth::{Authenticator, JwtIssuer};
use agent_protocol_server::cancel::CancelCoordinator;
use agent_protocol_server::config::{Config, TransportMode};
use agent_protocol_server::health::HealthSurface;
use agent_protocol_server::protocol::Implementation;
use agent_protocol_server::session::lifecycle::LifecycleManager;
use agent_protocol_server::shutdown::ShutdownCoordinator;
use agent_protocol_server::sse::SseBroker;
use agent_protocol_server::tools::builtin::calculate_tool;
use agent_protocol_server::tools::executor::ToolExecutor;
use agent_protocol_server::tools::registry::ToolRegistry;
use agent_protocol_server::transport::http::{self, AppState};
use agent_protocol_server::transport::stdio::StdioTransport;
use agent_protocol_server::transport::Dependencies;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let lifecycle = Arc::new(LifecycleManager::new(Implementation {
        name: "agent-protocol-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }));

    let registry = ToolRegistry::new(config.cursor_secret.clone());
    registry.register(calculate_tool())?;
    let executor = ToolExecutor::new(registry.clone());

    let broker = SseBroker::new();
    let cancel = CancelCoordinator::new();

    let deps = Dependencies {
        lifecycle: lifecycle.clone(),
        registry,
        executor,
        broker,
        cancel,
        chat: None,
    };

    let shutdown = Arc::new(ShutdownCoordinator::with_drain_timeout(lifecycle, config.shutdown_timeout()));
    let health = HealthSurface::new(shutdown.clone());

    let jwt = JwtIssuer::new(
        &config.oauth_signing_secret,
        config.oauth_issuer.clone(),
        "agent-protocol-server".to_string(),
        config.oauth_access_token_ttl(),
    );
    let oauth = Arc::new(OAuthServer::new(
        vec![OAuthClient {
            client_id: "demo-client".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
        }],
        vec![User {
            username: config.oauth_test_user.clone(),
            password: config.oauth_test_password.clone(),
            scope: "mcp:read mcp:write".to_string(),
        }],
        jwt.clone(),
        config.oauth_access_token_ttl(),
        config.oauth_refresh_token_ttl(),
    ));
    let authenticator = if config.auth_enabled {
        Some(Arc::new(Authenticator::new(jwt)))
    } else {
        None
    };

    match config.transport {
        TransportMode::Stdio => run_stdio(deps, shutdown).await,
        TransportMode::Http => run_http(&config, deps, authenticator, oauth, health, shutdown).await,
        TransportMode::Both => {
            let stdio_shutdown = shutdown.clone();
            let stdio_deps = deps.clone();
            let stdio_task = tokio::spawn(run_stdio(stdio_deps, stdio_shutdown));
            run_http(&config, deps, authenticator, oauth, health, shutdown).await?;
            stdio_task.await?;
            Ok(())
        },
    }
}

async fn run_stdio(deps: Dependencies, shutdown: Arc<ShutdownCoordinator>) -> anyhow::Result<()> {
    let transport = Arc::new(StdioTransport::new(deps));
    tracing::info!("listening on stdio");

    let run_handle = tokio::spawn(transport.clone().run());
    tokio::select! {
        _ = run_handle => {},
        _ = tokio::signal::ctrl_c() => {
            transport.close().await;
        },
    }
    shutdown.shutdown().await;
    Ok(())
}

async fn run_http(
    config: &Config,
    deps: Dependencies,
    authenticator: Option<Arc<Authenticator>>,
    oauth: Arc<OAuthServer>,
    health: HealthSurface,
    shutdown: Arc<ShutdownCoordinator>,
) -> anyhow::Result<()> {
    let state = AppState {
        deps,
        authenticator,
        oauth,
        health,
        allowed_origins: config.allowed_origins(),
        stateless: config.stateless,
    };
    let app = http::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "listening on http");

    let server_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "http server exited with error");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    shutdown.shutdown().await;
    server_task.abort();
    Ok(())
}
