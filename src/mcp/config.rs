//! Configuration resolution for the Proxmox SSH gateway.
//!
//! Configuration is resolved once at process start into an immutable
//! [`GatewayConfig`]. Each value follows a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! Requests may override `host` and `username` per call; nothing else is
//! mutable after startup.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PROXMOX_SSH_HOST` | 192.168.1.9 | Default remote host |
//! | `PROXMOX_SSH_USER` | root | Default SSH username |
//! | `PROXMOX_SSH_PORT` | 22 | SSH port |
//! | `PROXMOX_SSH_KEY_PATH` | ~/.ssh/id_ed25519 | Private key file |
//! | `PROXMOX_SSH_CONNECT_TIMEOUT` | 30s | TCP connect and handshake timeout in seconds |

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default remote host
pub(crate) const DEFAULT_HOST: &str = "192.168.1.9";

/// Default SSH username
pub(crate) const DEFAULT_USERNAME: &str = "root";

/// Default SSH port
pub(crate) const DEFAULT_PORT: u16 = 22;

/// Default connect timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Private key file name under `~/.ssh`
pub(crate) const DEFAULT_KEY_FILE_NAME: &str = "id_ed25519";

/// Environment variable name for the default host
pub(crate) const HOST_ENV_VAR: &str = "PROXMOX_SSH_HOST";

/// Environment variable name for the default username
pub(crate) const USERNAME_ENV_VAR: &str = "PROXMOX_SSH_USER";

/// Environment variable name for the SSH port
pub(crate) const PORT_ENV_VAR: &str = "PROXMOX_SSH_PORT";

/// Environment variable name for the private key path
pub(crate) const KEY_PATH_ENV_VAR: &str = "PROXMOX_SSH_KEY_PATH";

/// Environment variable name for the connect timeout
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "PROXMOX_SSH_CONNECT_TIMEOUT";

/// Fatal configuration errors raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot locate a home directory for the default SSH key; set PROXMOX_SSH_KEY_PATH")]
    NoHomeDirectory,
}

/// Process-wide gateway configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub host: String,
    pub username: String,
    pub port: u16,
    pub private_key_path: PathBuf,
    pub connect_timeout: Duration,
}

impl GatewayConfig {
    /// Resolve the configuration from the environment and built-in defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: resolve_host(None),
            username: resolve_username(None),
            port: resolve_port(None),
            private_key_path: resolve_key_path(None)?,
            connect_timeout: Duration::from_secs(resolve_connect_timeout(None)),
        })
    }

    /// Apply request overrides on top of the configured defaults.
    ///
    /// Blank overrides are treated as absent.
    pub fn target_for(&self, host: Option<&str>, username: Option<&str>) -> RemoteTarget {
        RemoteTarget {
            host: override_or(host, &self.host),
            username: override_or(username, &self.username),
            port: self.port,
        }
    }
}

fn override_or(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Where a single request is sent, after applying per-request overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub username: String,
    pub port: u16,
}

impl RemoteTarget {
    /// `host:port` form for connecting and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `user@host` form used in the remediation snippets.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Append `.pub` to a private key path.
pub(crate) fn public_key_path_for(private_key_path: &Path) -> PathBuf {
    let mut path = private_key_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Resolve the default host with priority: parameter -> env var -> default
pub(crate) fn resolve_host(host_param: Option<String>) -> String {
    resolve_string(host_param, HOST_ENV_VAR, DEFAULT_HOST)
}

/// Resolve the default username with priority: parameter -> env var -> default
pub(crate) fn resolve_username(username_param: Option<String>) -> String {
    resolve_string(username_param, USERNAME_ENV_VAR, DEFAULT_USERNAME)
}

fn resolve_string(param: Option<String>, env_var: &str, default: &str) -> String {
    // Priority 1: Use parameter if provided
    if let Some(value) = param {
        return value;
    }

    // Priority 2: Use environment variable if set and non-empty
    if let Ok(value) = env::var(env_var)
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    // Priority 3: Default value
    default.to_string()
}

/// Resolve the SSH port with priority: parameter -> env var -> default
pub(crate) fn resolve_port(port_param: Option<u16>) -> u16 {
    if let Some(port) = port_param {
        return port;
    }

    if let Ok(env_port) = env::var(PORT_ENV_VAR)
        && let Ok(port) = env_port.parse::<u16>()
    {
        return port;
    }

    DEFAULT_PORT
}

/// Resolve the connect timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the private key path with priority: parameter -> env var -> `~/.ssh/id_ed25519`
pub(crate) fn resolve_key_path(key_path_param: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = key_path_param {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(KEY_PATH_ENV_VAR)
        && !env_path.trim().is_empty()
    {
        return Ok(PathBuf::from(env_path.trim()));
    }

    dirs::home_dir()
        .map(|home| home.join(".ssh").join(DEFAULT_KEY_FILE_NAME))
        .ok_or(ConfigError::NoHomeDirectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Use a mutex to serialize env var tests to avoid race conditions
    static ENV_TEST_MUTEX: once_cell::sync::Lazy<StdMutex<()>> =
        once_cell::sync::Lazy::new(|| StdMutex::new(()));

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::set_var(key, value) };
    }

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn remove_env(key: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::remove_var(key) };
    }

    mod config_resolution {
        use super::*;

        mod host {
            use super::*;

            #[test]
            fn test_uses_param_when_provided() {
                assert_eq!(resolve_host(Some("10.0.0.5".to_string())), "10.0.0.5");
            }

            #[test]
            fn test_uses_env_var_when_no_param() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(HOST_ENV_VAR, "pve.lan");
                }
                let result = resolve_host(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(HOST_ENV_VAR);
                }
                assert_eq!(result, "pve.lan");
            }

            #[test]
            fn test_blank_env_var_falls_back_to_default() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(HOST_ENV_VAR, "   ");
                }
                let result = resolve_host(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(HOST_ENV_VAR);
                }
                assert_eq!(result, DEFAULT_HOST);
            }

            #[test]
            fn test_uses_default_when_no_param_or_env() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(HOST_ENV_VAR);
                }
                assert_eq!(resolve_host(None), DEFAULT_HOST);
            }
        }

        mod username {
            use super::*;

            #[test]
            fn test_param_takes_priority_over_env() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(USERNAME_ENV_VAR, "admin");
                }
                let result = resolve_username(Some("ops".to_string()));
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(USERNAME_ENV_VAR);
                }
                assert_eq!(result, "ops");
            }

            #[test]
            fn test_uses_default_when_no_param_or_env() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(USERNAME_ENV_VAR);
                }
                assert_eq!(resolve_username(None), "root");
            }
        }

        mod port {
            use super::*;

            #[test]
            fn test_uses_env_var_when_no_param() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(PORT_ENV_VAR, "2222");
                }
                let result = resolve_port(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(PORT_ENV_VAR);
                }
                assert_eq!(result, 2222);
            }

            #[test]
            fn test_ignores_out_of_range_env_var() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(PORT_ENV_VAR, "99999");
                }
                let result = resolve_port(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(PORT_ENV_VAR);
                }
                assert_eq!(result, DEFAULT_PORT);
            }

            #[test]
            fn test_uses_param_when_provided() {
                assert_eq!(resolve_port(Some(8022)), 8022);
            }
        }

        mod connect_timeout {
            use super::*;

            #[test]
            fn test_ignores_invalid_env_var() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(CONNECT_TIMEOUT_ENV_VAR, "soon");
                }
                let result = resolve_connect_timeout(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(CONNECT_TIMEOUT_ENV_VAR);
                }
                assert_eq!(result, DEFAULT_CONNECT_TIMEOUT_SECS);
            }

            #[test]
            fn test_uses_env_var_when_no_param() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(CONNECT_TIMEOUT_ENV_VAR, "5");
                }
                let result = resolve_connect_timeout(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(CONNECT_TIMEOUT_ENV_VAR);
                }
                assert_eq!(result, 5);
            }
        }

        mod key_path {
            use super::*;

            #[test]
            fn test_uses_param_when_provided() {
                let path = resolve_key_path(Some(PathBuf::from("/keys/pve"))).unwrap();
                assert_eq!(path, PathBuf::from("/keys/pve"));
            }

            #[test]
            fn test_uses_env_var_when_no_param() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    set_env(KEY_PATH_ENV_VAR, "/etc/gateway/id_rsa");
                }
                let result = resolve_key_path(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(KEY_PATH_ENV_VAR);
                }
                assert_eq!(result.unwrap(), PathBuf::from("/etc/gateway/id_rsa"));
            }

            #[test]
            fn test_default_follows_platform_home_dir() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(KEY_PATH_ENV_VAR);
                }
                let result = resolve_key_path(None);
                match dirs::home_dir() {
                    Some(home) => {
                        assert_eq!(result.unwrap(), home.join(".ssh").join(DEFAULT_KEY_FILE_NAME))
                    }
                    None => assert!(matches!(result, Err(ConfigError::NoHomeDirectory))),
                }
            }

            // dirs only consults HOME on unix
            #[cfg(unix)]
            #[test]
            fn test_default_is_under_home_ssh_dir() {
                let _guard = ENV_TEST_MUTEX.lock().unwrap();
                let saved_home = env::var("HOME").ok();
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    remove_env(KEY_PATH_ENV_VAR);
                    set_env("HOME", "/home/operator");
                }
                let result = resolve_key_path(None);
                // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
                unsafe {
                    match saved_home {
                        Some(home) => set_env("HOME", &home),
                        None => remove_env("HOME"),
                    }
                }
                assert_eq!(
                    result.unwrap(),
                    PathBuf::from("/home/operator/.ssh/id_ed25519")
                );
            }
        }
    }

    mod paths_and_targets {
        use super::*;

        fn sample_config() -> GatewayConfig {
            GatewayConfig {
                host: DEFAULT_HOST.to_string(),
                username: DEFAULT_USERNAME.to_string(),
                port: DEFAULT_PORT,
                private_key_path: PathBuf::from("/tmp/key"),
                connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            }
        }

        #[test]
        fn test_appends_pub_suffix() {
            assert_eq!(
                public_key_path_for(Path::new("/root/.ssh/id_ed25519")),
                PathBuf::from("/root/.ssh/id_ed25519.pub")
            );
        }

        #[test]
        fn test_keeps_existing_extension() {
            assert_eq!(
                public_key_path_for(Path::new("/keys/pve.key")),
                PathBuf::from("/keys/pve.key.pub")
            );
        }

        #[test]
        fn test_target_uses_defaults_without_overrides() {
            let target = sample_config().target_for(None, None);
            assert_eq!(target.host, DEFAULT_HOST);
            assert_eq!(target.username, DEFAULT_USERNAME);
            assert_eq!(target.address(), "192.168.1.9:22");
            assert_eq!(target.destination(), "root@192.168.1.9");
        }

        #[test]
        fn test_target_applies_overrides() {
            let target = sample_config().target_for(Some("10.0.0.7"), Some("admin"));
            assert_eq!(target.destination(), "admin@10.0.0.7");
            assert_eq!(target.port, DEFAULT_PORT);
        }

        #[test]
        fn test_blank_overrides_are_ignored() {
            let target = sample_config().target_for(Some("  "), Some(""));
            assert_eq!(target.destination(), "root@192.168.1.9");
        }
    }
}
