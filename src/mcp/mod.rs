//! Guarded SSH command gateway for a Proxmox host.
//!
//! This module is organized into the following submodules:
//!
//! - `guard`: Denylist check for destructive commands
//! - `config`: Connection defaults with environment variable support
//! - `credentials`: Per-request private key resolution
//! - `diagnostic`: Remediation reports for missing or rejected keys
//! - `session`: russh client handler
//! - `client`: One-shot SSH connection and output collection
//! - `gateway`: Request pipeline and response normalization
//! - `types`: Request and response envelopes
//! - `error`: Gateway error type
//! - `commands`: MCP tool implementation

mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod diagnostic;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod session;
pub mod types;

pub use client::{CommandExecutor, SshExecutor};
pub use commands::McpProxmoxCommands;
pub use config::{ConfigError, GatewayConfig, RemoteTarget};
pub use error::GatewayError;
pub use gateway::{Gateway, Outcome, RUN_HOST_COMMAND};
pub use types::{CommandRequest, GatewayResponse};
