//! Reference server for a JSON-RPC agent protocol, exposed over both a
//! line-delimited stdio transport and a streaming HTTP transport backed by
//! Server-Sent Events, with an embedded OAuth 2.1 authorization server.
//!
//! See `main.rs` for how these modules are wired together into the
//! `agent-protocol-server` binary.

pub mod auth;
pub mod cancel;
pub mod chat;
pub mod config;
pub mod error;
pub mod health;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod sse;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};
