//! Gateway error taxonomy and authentication-failure classification.
//!
//! Every failure a request can hit is a [`GatewayError`] variant. All of them are
//! recovered at the dispatch boundary and rendered into a failure envelope; none
//! of them terminates the process.
//!
//! # Classification Strategy
//!
//! russh normally reports a rejected key as an unsuccessful authentication
//! result, which maps straight to [`GatewayError::AuthenticationFailed`]. Some
//! servers instead close the connection or send a protocol error mid-auth. Those
//! messages go through [`is_auth_failure`] so that a credential rejection is
//! still routed to the diagnostic generator instead of being reported as a bare
//! connection error.

use std::path::PathBuf;

/// Authentication error patterns that indicate the key was rejected.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
    "all configured authentication methods failed",
];

/// Errors produced while serving one command request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The command matched the denylist
    #[error(
        "SECURITY BLOCK: Command \"{command}\" contains potentially destructive operations and is not allowed (matched \"{pattern}\"). Destructive actions must be performed manually via the Proxmox web interface."
    )]
    SecurityBlocked {
        command: String,
        pattern: &'static str,
    },

    /// The private key file does not exist
    #[error("SSH private key not found at {}", .0.display())]
    MissingCredential(PathBuf),

    /// The private key exists but could not be read
    #[error("Failed to read SSH private key from {}: {source}", .path.display())]
    KeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The private key could not be decoded (corrupt or passphrase-protected)
    #[error("Failed to load SSH private key from {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    /// The remote host rejected every configured authentication method
    #[error("All configured authentication methods failed for {username}@{host}")]
    AuthenticationFailed { host: String, username: String },

    /// Network or handshake failure
    #[error("SSH connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// The session was established but the program could not be started
    #[error("Remote execution failed: {0}")]
    RemoteExecFailed(String),

    /// The caller asked for a capability this gateway does not expose
    #[error("Unknown tool")]
    UnknownOperation(String),

    /// Malformed or empty request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Whether the failure should be routed to the auth-failure diagnostic.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, GatewayError::AuthenticationFailed { .. })
    }
}

/// Determines if a transport error message describes a rejected credential.
///
/// Matching is case-insensitive against [`AUTH_ERRORS`].
///
/// # Examples
///
/// ```rust,ignore
/// assert!(is_auth_failure("Permission denied (publickey)"));
/// assert!(!is_auth_failure("Connection refused"));
/// ```
pub(crate) fn is_auth_failure(error: &str) -> bool {
    let error_lower = error.to_lowercase();
    AUTH_ERRORS
        .iter()
        .any(|pattern| error_lower.contains(pattern))
}
