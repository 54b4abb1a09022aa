//! MCP tool surface for the Proxmox command gateway.
//!
//! A single tool is exposed:
//!
//! - `proxmox_run_host_command`: run one guarded shell command on the Proxmox host
//!
//! The tool text is always the pretty-printed JSON envelope. Failure envelopes
//! are returned through the error branch so the MCP result carries `isError`.

use poem_mcpserver::{Tools, content::Text};
use tracing::debug;

use super::gateway::{Gateway, RUN_HOST_COMMAND};
use super::types::CommandRequest;

/// MCP tool implementation backed by a [`Gateway`].
pub struct McpProxmoxCommands {
    gateway: Gateway,
}

impl McpProxmoxCommands {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[Tools]
impl McpProxmoxCommands {
    /// Run a shell command on the Proxmox host over SSH and return its output.
    ///
    /// Destructive commands (deleting files, destroying VMs or containers,
    /// wiping disks, rebooting) are refused and must be done manually through
    /// the Proxmox web interface. If SSH keys are not set up yet, the result
    /// contains step-by-step setup instructions instead of command output.
    async fn proxmox_run_host_command(
        &self,
        /// Shell command to execute on the Proxmox host (e.g., "pvesh get /nodes", "qm list")
        command: String,
        /// Host to connect to instead of the configured default (env: PROXMOX_SSH_HOST)
        host: Option<String>,
        /// SSH username instead of the configured default (env: PROXMOX_SSH_USER)
        username: Option<String>,
    ) -> Result<Text<String>, String> {
        debug!("Tool {} called", RUN_HOST_COMMAND);

        let request = CommandRequest {
            command,
            host,
            username,
        };
        let response = self.gateway.handle_guarded(request).await;
        let text = response.to_json();

        if response.is_error() {
            Err(text)
        } else {
            Ok(Text(text))
        }
    }
}
