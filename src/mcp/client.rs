//! SSH connection and command execution.
//!
//! ## Connection Lifecycle
//!
//! Every request gets its own connection; nothing is pooled or reused.
//!
//! 1. **Client Configuration**: keepalive on, no inactivity timeout, so a
//!    long-running command is never cut off by the client.
//!
//! 2. **Connection Establishment**: TCP connect plus SSH handshake, bounded by
//!    the configured connect timeout.
//!
//! 3. **Authentication**: the resolved private key only, via [`KeyAuth`].
//!
//! 4. **Command Execution**: the literal command string is sent as an `exec`
//!    request. Output is collected until the channel closes.
//!
//! 5. **Teardown**: the connection is disconnected as soon as the remote
//!    program's output closes, whether the run succeeded or not.
//!
//! ## Output Collection
//!
//! Channel messages are pumped into two queues, one per stream, each drained by
//! its own accumulation loop. The pump and both loops are joined before the
//! result is built. Each stream keeps its own append order; there is no ordering
//! between stdout and stderr.
//!
//! There is no retry at this layer and no command timeout. Once a command is
//! started the gateway waits for the channel to close.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt, future};
use russh::{ChannelMsg, Disconnect, Sig, client};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mcp::auth::KeyAuth;
use crate::mcp::config::RemoteTarget;
use crate::mcp::credentials::Credentials;
use crate::mcp::error::GatewayError;
use crate::mcp::session::SshClientHandler;
use crate::mcp::types::ExecutionResult;

/// Runs one command on one remote target.
///
/// The gateway only depends on this trait, so the SSH transport can be
/// replaced in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `command` on `target`, authenticating with `credentials`.
    ///
    /// # Errors
    ///
    /// * `ConnectionFailed` - network or handshake failure
    /// * `AuthenticationFailed` - the remote host rejected the key
    /// * `RemoteExecFailed` - the session was up but the program could not start
    async fn execute(
        &self,
        command: &str,
        target: &RemoteTarget,
        credentials: &Credentials,
    ) -> Result<ExecutionResult, GatewayError>;
}

/// [`CommandExecutor`] backed by a fresh russh connection per call.
pub struct SshExecutor {
    connect_timeout: Duration,
}

impl SshExecutor {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connect and authenticate, returning a ready session handle.
    async fn connect(
        &self,
        target: &RemoteTarget,
        credentials: &Credentials,
    ) -> Result<client::Handle<SshClientHandler>, GatewayError> {
        let config = build_client_config();
        let handler = SshClientHandler::new(target.host.clone());

        let connect_future = client::connect(config, (target.host.as_str(), target.port), handler);

        let mut handle = tokio::time::timeout(self.connect_timeout, connect_future)
            .await
            .map_err(|_| GatewayError::ConnectionFailed {
                address: target.address(),
                reason: format!("Connection timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| GatewayError::ConnectionFailed {
                address: target.address(),
                reason: e.to_string(),
            })?;

        if let Err(e) = KeyAuth::new(credentials).authenticate(&mut handle, target).await {
            disconnect(&handle, target).await;
            return Err(e);
        }

        debug!("Authenticated to {}", target.destination());
        Ok(handle)
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(
        &self,
        command: &str,
        target: &RemoteTarget,
        credentials: &Credentials,
    ) -> Result<ExecutionResult, GatewayError> {
        let handle = self.connect(target, credentials).await?;

        info!("Executing on {}: {}", target.destination(), command);
        let output = run_command(&handle, command).await;

        // Tear down regardless of how the command went
        disconnect(&handle, target).await;

        let result = output?.into_result();
        info!(
            "Command on {} finished: exit_code={:?}, signal={:?}",
            target.destination(),
            result.exit_code,
            result.signal
        );
        Ok(result)
    }
}

/// Build the russh client configuration.
///
/// Keepalive detects a dead peer. No inactivity timeout: a command may run for
/// as long as it needs.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

async fn disconnect(handle: &client::Handle<SshClientHandler>, target: &RemoteTarget) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        warn!("Error during disconnect from {}: {}", target.address(), e);
    }
}

/// Open a session channel, exec the command, and collect its output.
async fn run_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
) -> Result<RemoteOutput, GatewayError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| GatewayError::RemoteExecFailed(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| GatewayError::RemoteExecFailed(format!("Failed to execute command: {}", e)))?;

    let messages = futures::stream::unfold(channel, |mut channel| async move {
        let msg = channel.wait().await?;
        Some((msg, channel))
    });

    collect_output(messages.filter_map(|msg| future::ready(ChannelEvent::from_msg(msg)))).await
}

/// Channel messages the collector cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    ExitSignal(String),
    /// The server refused the exec request
    ExecRejected,
    Eof,
    Close,
}

impl ChannelEvent {
    fn from_msg(msg: ChannelMsg) -> Option<Self> {
        match msg {
            ChannelMsg::Data { data } => Some(ChannelEvent::Stdout(data.to_vec())),
            // ext == 1 is stderr in SSH protocol
            ChannelMsg::ExtendedData { data, ext: 1 } => Some(ChannelEvent::Stderr(data.to_vec())),
            ChannelMsg::ExitStatus { exit_status } => Some(ChannelEvent::ExitStatus(exit_status)),
            ChannelMsg::ExitSignal { signal_name, .. } => {
                Some(ChannelEvent::ExitSignal(signal_name_of(&signal_name)))
            }
            ChannelMsg::Failure => Some(ChannelEvent::ExecRejected),
            ChannelMsg::Eof => Some(ChannelEvent::Eof),
            ChannelMsg::Close => Some(ChannelEvent::Close),
            _ => None,
        }
    }
}

/// Signal name without the `SIG` prefix, as sent on the wire.
fn signal_name_of(sig: &Sig) -> String {
    match sig {
        Sig::ABRT => "ABRT".to_string(),
        Sig::ALRM => "ALRM".to_string(),
        Sig::FPE => "FPE".to_string(),
        Sig::HUP => "HUP".to_string(),
        Sig::ILL => "ILL".to_string(),
        Sig::INT => "INT".to_string(),
        Sig::KILL => "KILL".to_string(),
        Sig::PIPE => "PIPE".to_string(),
        Sig::QUIT => "QUIT".to_string(),
        Sig::SEGV => "SEGV".to_string(),
        Sig::TERM => "TERM".to_string(),
        Sig::USR1 => "USR1".to_string(),
        Sig::Custom(name) => name.clone(),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}

/// Raw output of one remote program run.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RemoteOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<u32>,
    pub signal: Option<String>,
}

impl RemoteOutput {
    /// Normalize into the caller-facing result: lossy UTF-8, trimmed text.
    pub fn into_result(self) -> ExecutionResult {
        // A signal-terminated program has no exit status
        let exit_code = match self.signal {
            Some(_) => None,
            None => self.exit_code.map(|c| c as i32),
        };

        ExecutionResult {
            success: exit_code == Some(0),
            exit_code,
            signal: self.signal,
            stdout: String::from_utf8_lossy(&self.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&self.stderr).trim().to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct ExitState {
    exit_code: Option<u32>,
    signal: Option<String>,
}

impl ExitState {
    fn is_known(&self) -> bool {
        self.exit_code.is_some() || self.signal.is_some()
    }
}

/// Collect one channel's events into a [`RemoteOutput`].
///
/// The event pump forwards stream data into one queue per stream while
/// recording exit status. Each queue is drained by its own loop. Dropping the
/// pump's senders ends both loops, and all three are joined before returning.
pub(crate) async fn collect_output<S>(events: S) -> Result<RemoteOutput, GatewayError>
where
    S: Stream<Item = ChannelEvent>,
{
    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let pump = async move {
        futures::pin_mut!(events);
        let mut state = ExitState::default();
        let mut received_output = false;

        while let Some(event) = events.next().await {
            match event {
                ChannelEvent::Stdout(data) => {
                    received_output = true;
                    // The receiver outlives this loop; send only fails after it is gone
                    let _ = stdout_tx.send(data);
                }
                ChannelEvent::Stderr(data) => {
                    received_output = true;
                    let _ = stderr_tx.send(data);
                }
                ChannelEvent::ExitStatus(code) => state.exit_code = Some(code),
                ChannelEvent::ExitSignal(name) => state.signal = Some(name),
                ChannelEvent::ExecRejected => {
                    if !received_output && !state.is_known() {
                        return Err(GatewayError::RemoteExecFailed(
                            "Remote host refused to execute the command".to_string(),
                        ));
                    }
                    debug!("Ignoring channel failure after the command started");
                }
                ChannelEvent::Eof => {
                    // Continue to wait for exit status if not received yet
                    if state.is_known() {
                        break;
                    }
                }
                ChannelEvent::Close => break,
            }
        }

        Ok(state)
    };

    let (state, stdout, stderr) = tokio::join!(
        pump,
        accumulate(stdout_rx),
        accumulate(stderr_rx)
    );
    let state = state?;

    Ok(RemoteOutput {
        stdout,
        stderr,
        exit_code: state.exit_code,
        signal: state.signal,
    })
}

/// Append every chunk of one stream, in arrival order.
async fn accumulate(mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(4096);
    while let Some(chunk) = rx.recv().await {
        buffer.extend_from_slice(&chunk);
    }
    buffer
}
