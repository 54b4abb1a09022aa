//! Private key SSH authentication.

use std::sync::Arc;

use russh::{client, keys};
use tracing::debug;

use crate::mcp::config::RemoteTarget;
use crate::mcp::credentials::Credentials;
use crate::mcp::error::{GatewayError, is_auth_failure};
use crate::mcp::session::SshClientHandler;

/// Public key authentication with the key decoded for this request.
///
/// Supports passphrase-less keys only. There is no password or agent fallback.
pub struct KeyAuth<'a> {
    credentials: &'a Credentials,
}

impl<'a> KeyAuth<'a> {
    pub fn new(credentials: &'a Credentials) -> Self {
        Self { credentials }
    }

    /// Attempt public key authentication for `target.username`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The server accepted the key
    /// * `Err(GatewayError::AuthenticationFailed)` - The server rejected the key
    /// * `Err(GatewayError::ConnectionFailed)` - Transport error during auth
    pub async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        target: &RemoteTarget,
    ) -> Result<(), GatewayError> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash =
            keys::PrivateKeyWithHashAlg::new(Arc::clone(&self.credentials.private_key), hash_alg);

        let rejected = || GatewayError::AuthenticationFailed {
            host: target.host.clone(),
            username: target.username.clone(),
        };

        match handle
            .authenticate_publickey(target.username.as_str(), key_with_hash)
            .await
        {
            Ok(result) if result.success() => Ok(()),
            Ok(_) => Err(rejected()),
            Err(e) if is_auth_failure(&e.to_string()) => Err(rejected()),
            Err(e) => Err(GatewayError::ConnectionFailed {
                address: target.address(),
                reason: format!("SSH error during authentication: {}", e),
            }),
        }
    }
}
