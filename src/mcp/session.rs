//! russh client handler for one-shot gateway connections.
//!
//! Each request builds its own [`SshClientHandler`] and drops it together with
//! the connection, so no handler state outlives a request.

use russh::{client, keys};
use tracing::debug;

/// Client handler for russh that accepts all host keys.
///
/// Similar to `StrictHostKeyChecking=no` in OpenSSH configuration: the target is
/// an operator-configured host on a trusted network and the gateway has no
/// known_hosts store of its own.
pub struct SshClientHandler {
    host: String,
}

impl SshClientHandler {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting {} host key from {}",
            server_public_key.algorithm(),
            self.host
        );
        Ok(true)
    }
}
