//! Request pipeline and result normalization.
//!
//! A request flows through these stages, stopping at the first one that
//! produces an answer:
//!
//! 1. Validation (non-empty command)
//! 2. Denylist check ([`guard::classify`])
//! 3. Private key resolution, which reports a missing key without touching the network
//! 4. Remote execution, with authentication failures turned into a remediation report
//!
//! Exactly one of an execution result, a diagnostic report or an error comes
//! out of the pipeline, and [`Gateway::handle`] maps it to a single
//! [`GatewayResponse`] envelope. [`Gateway::handle_guarded`] and
//! [`Gateway::dispatch`] are the outer boundary: they turn anything
//! unexpected, panics included, into a failure envelope.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::mcp::client::{CommandExecutor, SshExecutor};
use crate::mcp::config::{GatewayConfig, RemoteTarget};
use crate::mcp::credentials;
use crate::mcp::diagnostic::{diagnose_auth_failure, missing_key_report};
use crate::mcp::error::GatewayError;
use crate::mcp::guard;
use crate::mcp::types::{
    CommandRequest, CommandResponse, DiagnosticReport, ExecutionResult, FailureResponse,
    GatewayResponse,
};

/// Name of the single operation this gateway exposes.
pub const RUN_HOST_COMMAND: &str = "proxmox_run_host_command";

/// What the pipeline produced for one request.
#[derive(Debug)]
pub enum Outcome {
    /// The command ran on `target`
    Executed {
        target: RemoteTarget,
        result: ExecutionResult,
    },
    /// Setup is incomplete; nothing ran
    Diagnostic(DiagnosticReport),
}

/// The command gateway: immutable configuration plus an executor.
///
/// Cloning is cheap and every clone shares the same configuration. There is no
/// other shared state, so concurrent requests never coordinate.
pub struct Gateway<E = SshExecutor> {
    config: Arc<GatewayConfig>,
    executor: Arc<E>,
}

impl<E> Clone for Gateway<E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl Gateway<SshExecutor> {
    /// Gateway that executes over SSH.
    pub fn new(config: GatewayConfig) -> Self {
        let executor = SshExecutor::new(config.connect_timeout);
        Self::with_executor(config, executor)
    }
}

impl<E: CommandExecutor> Gateway<E> {
    pub fn with_executor(config: GatewayConfig, executor: E) -> Self {
        Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the request pipeline.
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome::Executed)` - The command ran (any exit status)
    /// * `Ok(Outcome::Diagnostic)` - Missing key or rejected key, with instructions
    /// * `Err(GatewayError)` - Blocked, invalid, or a non-auth execution failure
    pub async fn run_host_command(&self, request: &CommandRequest) -> Result<Outcome, GatewayError> {
        if request.command.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "command must not be empty".to_string(),
            ));
        }

        let verdict = guard::classify(&request.command);
        if let Some(pattern) = verdict.matched_pattern {
            warn!(
                "Blocked command {:?} (matched {:?})",
                request.command, pattern
            );
            return Err(GatewayError::SecurityBlocked {
                command: request.command.clone(),
                pattern,
            });
        }

        let target = self
            .config
            .target_for(request.host.as_deref(), request.username.as_deref());
        let key_path = &self.config.private_key_path;

        // Key problems surface here, before any connection is opened
        let credentials = match credentials::resolve(key_path).await {
            Ok(credentials) => credentials,
            Err(e @ GatewayError::MissingCredential(_)) => {
                warn!("{}", e);
                return Ok(Outcome::Diagnostic(missing_key_report(key_path, &target)));
            }
            Err(e) => return Err(e),
        };

        match self
            .executor
            .execute(&request.command, &target, &credentials)
            .await
        {
            Ok(result) => Ok(Outcome::Executed { target, result }),
            Err(e) if e.is_authentication_failure() => {
                warn!("{}", e);
                Ok(Outcome::Diagnostic(
                    diagnose_auth_failure(key_path, &target).await,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Run one request and normalize the outcome into an envelope.
    pub async fn handle(&self, request: CommandRequest) -> GatewayResponse {
        match self.run_host_command(&request).await {
            Ok(Outcome::Executed { target, result }) => {
                GatewayResponse::Completed(CommandResponse {
                    success: true,
                    command: request.command,
                    host: target.host,
                    exit_code: result.exit_code,
                    signal: result.signal,
                    stdout: result.stdout,
                    stderr: result.stderr,
                })
            }
            Ok(Outcome::Diagnostic(report)) => GatewayResponse::Failed(report.into()),
            Err(e) => {
                error!("Error executing {}: {}", RUN_HOST_COMMAND, e);
                GatewayResponse::Failed(FailureResponse::new(e.to_string()))
            }
        }
    }

    /// [`handle`](Self::handle) behind the panic boundary.
    ///
    /// This is what the MCP tool calls: the request is already typed, so there
    /// is no routing step.
    pub async fn handle_guarded(&self, request: CommandRequest) -> GatewayResponse {
        catch_panics(RUN_HOST_COMMAND, self.handle(request)).await
    }

    /// Route an operation by name, with JSON arguments.
    ///
    /// Unknown names get an "Unknown tool" failure without any I/O. A panic
    /// while serving the request is caught here and reported as a failure.
    ///
    /// Over MCP, poem-mcpserver answers calls to unregistered tool names at the
    /// protocol layer, so those never reach this method. It serves callers that
    /// hold an untyped operation name, such as embedding code and tests.
    pub async fn dispatch(&self, operation: &str, arguments: serde_json::Value) -> GatewayResponse {
        catch_panics(operation, self.route(operation, arguments)).await
    }

    async fn route(&self, operation: &str, arguments: serde_json::Value) -> GatewayResponse {
        match operation {
            RUN_HOST_COMMAND => match serde_json::from_value::<CommandRequest>(arguments) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    let err = GatewayError::InvalidRequest(e.to_string());
                    warn!("{}", err);
                    GatewayResponse::Failed(FailureResponse::new(err.to_string()))
                }
            },
            other => {
                let err = GatewayError::UnknownOperation(other.to_string());
                info!("Rejected unknown operation {:?}", other);
                GatewayResponse::Failed(FailureResponse::new(err.to_string()))
            }
        }
    }
}

/// Run `future`, turning a panic into a failure envelope.
async fn catch_panics<F>(operation: &str, future: F) -> GatewayResponse
where
    F: Future<Output = GatewayResponse>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Error executing {}: {}", operation, message);
            GatewayResponse::Failed(FailureResponse::new(format!(
                "Internal error while executing {}: {}",
                operation, message
            )))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
