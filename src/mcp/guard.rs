//! Denylist filter for commands sent to the Proxmox host.
//!
//! Every command is checked against a fixed, ordered list of dangerous
//! fragments before any credential or network work happens.
//!
//! # Matching Strategy
//!
//! Matching is a case-insensitive substring test over the whole command string.
//! There is no shell parsing: a fragment inside a quoted string, a comment or an
//! unrelated argument still blocks the command. False positives are accepted in
//! exchange for never letting a destructive operation through.
//!
//! A tokenizing or allowlist-based filter would be harder to evade (extra
//! whitespace, quoting tricks) and would stop over-blocking words such as
//! `delete ` in harmless contexts. Changing that is a behavior change for
//! operators and has to be made explicitly, not folded into a refactor.
//!
//! # Examples
//!
//! ```rust,ignore
//! use proxmox_ssh_mcp::mcp::guard::classify;
//!
//! assert!(classify("rm -rf /data").blocked);
//! assert!(!classify("ls -la /data").blocked);
//! ```

use once_cell::sync::Lazy;

/// Dangerous command fragments, checked in order.
const DANGEROUS_FRAGMENTS: &[&str] = &[
    // VM/Container deletion
    "qm destroy",
    "qm delete",
    "pct destroy",
    "pct delete",
    // Storage operations
    "rm ",
    "rmdir",
    "rm -",
    "del ",
    "delete ",
    // System operations
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    // File system operations
    "mkfs",
    "fdisk",
    "parted",
    "dd if=",
    "dd of=",
    // Package management
    "apt remove",
    "apt purge",
    "apt autoremove",
    "dpkg -r",
    "dpkg --remove",
    // Service management
    "systemctl stop",
    "systemctl disable",
    "service stop",
    // Network operations
    "iptables -D",
    "iptables -F",
    "ip route del",
    // User management
    "userdel",
    "deluser",
    "passwd -d",
    // Backup deletion
    "vzdump --remove",
    "pvesm remove",
    // Storage deletion
    "pvesm delete",
    "zfs destroy",
    "lvremove",
    // Cluster operations
    "pvecm delnode",
    "pvecm delete",
];

/// Lowercased fragments paired with their original spelling.
static LOWERED_FRAGMENTS: Lazy<Vec<(String, &'static str)>> = Lazy::new(|| {
    DANGEROUS_FRAGMENTS
        .iter()
        .map(|fragment| (fragment.to_lowercase(), *fragment))
        .collect()
});

/// Outcome of checking a command against the denylist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityVerdict {
    pub blocked: bool,
    /// First fragment (in list order) found in the command
    pub matched_pattern: Option<&'static str>,
}

impl SecurityVerdict {
    fn permitted() -> Self {
        Self {
            blocked: false,
            matched_pattern: None,
        }
    }

    fn blocked_by(fragment: &'static str) -> Self {
        Self {
            blocked: true,
            matched_pattern: Some(fragment),
        }
    }
}

/// Classify a command as blocked or permitted.
///
/// Returns a blocked verdict carrying the first matching fragment, in list
/// order, or a permitted verdict when no fragment occurs anywhere in the
/// command.
pub fn classify(command: &str) -> SecurityVerdict {
    let command_lower = command.to_lowercase();

    LOWERED_FRAGMENTS
        .iter()
        .find(|(lowered, _)| command_lower.contains(lowered.as_str()))
        .map(|(_, fragment)| SecurityVerdict::blocked_by(fragment))
        .unwrap_or_else(SecurityVerdict::permitted)
}
