//! Operator-facing remediation reports for key setup problems.
//!
//! Two situations produce a [`DiagnosticReport`] instead of an execution result:
//!
//! - the private key file is missing locally ([`missing_key_report`])
//! - the key exists but the remote host rejected it ([`diagnose_auth_failure`])
//!
//! Both are plain text meant to be shown to an operator as-is. Nothing in this
//! module touches the network, and a failed connection is never retried from
//! here: the operator fixes the setup and sends the request again.

use std::path::Path;

use tracing::debug;

use crate::mcp::config::{RemoteTarget, public_key_path_for};
use crate::mcp::types::DiagnosticReport;

/// Shown in place of the public key when the `.pub` file can't be read.
pub(crate) const PUBLIC_KEY_PLACEHOLDER: &str = "<could not read public key>";

/// Remote half of the Windows one-liner that appends stdin to `authorized_keys`.
const APPEND_AUTHORIZED_KEYS: &str = "mkdir -p ~/.ssh && chmod 700 ~/.ssh && cat >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys";

/// Build the report for a private key that does not exist.
pub fn missing_key_report(private_key_path: &Path, target: &RemoteTarget) -> DiagnosticReport {
    let snippets = SetupSnippets::new(private_key_path, target);

    let instructions = format!(
        "SSH Key Setup Required

Your SSH private key was not found at: {key_path}

Step 1: Generate an SSH key pair
  ssh-keygen -t ed25519 -f {key_path}

Step 2: Copy your public key to the Proxmox server
  Windows (PowerShell):
    {windows}

  Linux/Mac:
    {unix}

Step 3: Test the connection
  {test}

After completing these steps, send the command again.",
        key_path = private_key_path.display(),
        windows = snippets.windows_copy(),
        unix = snippets.unix_copy(),
        test = snippets.connection_test(),
    );

    DiagnosticReport {
        ready: false,
        success: false,
        error: "SSH private key not found".to_string(),
        instructions,
    }
}

/// Build the report for a key the remote host refused.
///
/// Reads the matching `.pub` file for display. A missing or unreadable public
/// key does not abort the report; [`PUBLIC_KEY_PLACEHOLDER`] is shown instead.
pub async fn diagnose_auth_failure(
    private_key_path: &Path,
    target: &RemoteTarget,
) -> DiagnosticReport {
    let public_key = read_public_key(private_key_path).await;
    let snippets = SetupSnippets::new(private_key_path, target);

    let instructions = format!(
        "SSH Key Not Authorized

Your SSH key exists but is not authorized on the Proxmox server ({destination}).

Your public key:
{public_key}

Add it to the Proxmox server by running:
  {login}  # (enter password when prompted)

Then on the server:
  mkdir -p ~/.ssh && chmod 700 ~/.ssh
  echo '{public_key}' >> ~/.ssh/authorized_keys
  chmod 600 ~/.ssh/authorized_keys
  exit

Or from your local machine (one command):
  Windows (PowerShell):
    {windows}

  Linux/Mac:
    {unix}",
        destination = target.destination(),
        login = snippets.login(),
        windows = snippets.windows_copy(),
        unix = snippets.unix_copy(),
    );

    DiagnosticReport {
        ready: true,
        success: false,
        error: "SSH key not authorized on server".to_string(),
        instructions,
    }
}

/// Read the public key next to `private_key_path`, trimmed.
async fn read_public_key(private_key_path: &Path) -> String {
    let public_key_path = public_key_path_for(private_key_path);

    match tokio::fs::read_to_string(&public_key_path).await {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        Ok(_) => {
            debug!("Public key file {:?} is empty", public_key_path);
            PUBLIC_KEY_PLACEHOLDER.to_string()
        }
        Err(e) => {
            debug!("Could not read public key {:?}: {}", public_key_path, e);
            PUBLIC_KEY_PLACEHOLDER.to_string()
        }
    }
}

/// Shell snippets for installing the key, rendered for one target.
struct SetupSnippets {
    destination: String,
    port_flag: String,
    public_key_path: String,
    public_key_file_name: String,
}

impl SetupSnippets {
    fn new(private_key_path: &Path, target: &RemoteTarget) -> Self {
        let public_key_path = public_key_path_for(private_key_path);
        let public_key_file_name = public_key_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "id_ed25519.pub".to_string());

        // Only spell out the port when it differs from the SSH default
        let port_flag = if target.port == 22 {
            String::new()
        } else {
            format!("-p {} ", target.port)
        };

        Self {
            destination: target.destination(),
            port_flag,
            public_key_path: public_key_path.display().to_string(),
            public_key_file_name,
        }
    }

    fn login(&self) -> String {
        format!("ssh {}{}", self.port_flag, self.destination)
    }

    fn windows_copy(&self) -> String {
        format!(
            "type $env:USERPROFILE\\.ssh\\{} | ssh {}{} \"{}\"",
            self.public_key_file_name, self.port_flag, self.destination, APPEND_AUTHORIZED_KEYS
        )
    }

    fn unix_copy(&self) -> String {
        format!(
            "ssh-copy-id -i {} {}{}",
            self.public_key_path, self.port_flag, self.destination
        )
    }

    fn connection_test(&self) -> String {
        format!(
            "ssh {}{} \"echo 'SSH key auth works!'\"",
            self.port_flag, self.destination
        )
    }
}
