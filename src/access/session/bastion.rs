//! The bastion session: one ssh child process carrying every local forward.
//!
//! ## Lifecycle
//!
//! ```text
//! NEW --start()--> STARTING --all ready--> READY --close()--> CLOSING --exit--> CLOSED
//!                  STARTING --timeout / child exit--> FAILED
//!                  READY    --unexpected child exit--> FAILED
//! ```
//!
//! ## Process ownership
//!
//! The child is moved into a reaper task right after spawn. The reaper waits
//! for whichever comes first: the child exiting on its own (which marks the
//! session `FAILED` when it was `STARTING` or `READY`), or the close token
//! being cancelled (which terminates the child: SIGTERM, a grace period, then
//! SIGKILL). The session keeps the token and the task handle, so `close()`
//! only has to cancel and join.
//!
//! Authentication, host keys and known-hosts handling all stay inside the
//! ssh binary and the user's own configuration. Its stderr is inherited so
//! prompts and warnings reach the operator. The child ignores SIGINT, so a
//! Ctrl-C aimed at the database client leaves the tunnel up until `close()`.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::{Tunnel, TunnelFactory};
use crate::access::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SESSION_START_DEADLINE_SECS};
use crate::access::error::AccessError;
use crate::access::probe;
use crate::access::ssh_config::SshConfig;
use crate::access::types::{BastionSpec, Forward, ForwardName, ForwardSet, SessionState};

/// Time the child gets to exit after SIGTERM before it is killed
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ssh_program: PathBuf,
    /// Overall time allowed for every forward to become ready.
    pub start_deadline: Duration,
    /// Passed to ssh as `ConnectTimeout`.
    pub connect_timeout: Duration,
    pub termination_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ssh_program: PathBuf::from("ssh"),
            start_deadline: Duration::from_secs(DEFAULT_SESSION_START_DEADLINE_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            termination_grace: DEFAULT_TERMINATION_GRACE,
        }
    }
}

struct Reaper {
    pid: Option<u32>,
    close_token: CancellationToken,
    handle: JoinHandle<io::Result<ExitStatus>>,
}

pub struct BastionSession {
    id: Uuid,
    options: SessionOptions,
    forwards: ForwardSet,
    state_tx: watch::Sender<SessionState>,
    reaper: Option<Reaper>,
    ready_at: Option<DateTime<Utc>>,
}

impl BastionSession {
    pub fn new(options: SessionOptions) -> Self {
        let (state_tx, _) = watch::channel(SessionState::New);
        Self {
            id: Uuid::new_v4(),
            options,
            forwards: ForwardSet::new(),
            state_tx,
            reaper: None,
            ready_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Process id of the ssh child while one is owned.
    pub fn pid(&self) -> Option<u32> {
        self.reaper.as_ref().and_then(|r| r.pid)
    }

    /// Observe state transitions, including ones made by the reaper.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session {}: {} -> {}", self.id, previous, state);
        }
    }

    fn promote_to_ready(&self) -> bool {
        self.state_tx.send_if_modified(|s| {
            if *s == SessionState::Starting {
                *s = SessionState::Ready;
                true
            } else {
                false
            }
        })
    }

    /// Stop the child after a failed start and report the final error.
    async fn abort_startup(&mut self, failure: AccessError) -> AccessError {
        let status = match self.reaper.take() {
            Some(reaper) => {
                reaper.close_token.cancel();
                match reaper.handle.await {
                    Ok(Ok(status)) => status.code(),
                    _ => None,
                }
            }
            None => None,
        };
        self.set_state(SessionState::Failed);
        match failure {
            AccessError::StartupFailed { .. } => AccessError::StartupFailed { status },
            other => other,
        }
    }
}

/// Arguments for `ssh`: no remote command, every forward, fail if any forward fails.
pub(crate) fn ssh_args(spec: &BastionSpec, forwards: &ForwardSet, connect_timeout: Duration) -> Vec<String> {
    let mut args = vec![
        "-N".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)),
        "-l".to_string(),
        spec.user.clone(),
    ];
    if let Some(port) = spec.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(identity) = &spec.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }
    for forward in forwards.iter() {
        args.push("-L".to_string());
        args.push(forward.ssh_spec());
    }
    args.push(spec.host.clone());
    args
}

async fn reap(
    mut child: Child,
    close: CancellationToken,
    grace: Duration,
    state: watch::Sender<SessionState>,
) -> io::Result<ExitStatus> {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = close.cancelled() => None,
    };

    match exited {
        Some(status) => {
            let status = status?;
            let unexpected = state.send_if_modified(|s| {
                if matches!(s, SessionState::Starting | SessionState::Ready) {
                    *s = SessionState::Failed;
                    true
                } else {
                    false
                }
            });
            if unexpected {
                warn!("ssh exited unexpectedly ({})", status);
            }
            Ok(status)
        }
        None => terminate(&mut child, grace).await,
    }
}

/// Keep the child alive when Ctrl-C reaches the foreground process group.
///
/// The database client shares the terminal with ssh; an interrupt meant for
/// the client must not take the tunnel down. The child stays in our process
/// group so ssh can still prompt on `/dev/tty`.
#[cfg(unix)]
fn ignore_terminal_interrupt(command: &mut Command) {
    use nix::sys::signal::{SigHandler, Signal, signal};

    // SAFETY: only `signal(2)` runs between fork and exec, which is
    // async-signal-safe.
    unsafe {
        command.pre_exec(|| {
            signal(Signal::SIGINT, SigHandler::SigIgn)
                .map(drop)
                .map_err(io::Error::from)
        });
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        debug!("Sending SIGTERM to ssh (pid {})", pid);
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("SIGTERM to pid {} failed: {}", pid, e);
        }
    }
    #[cfg(not(unix))]
    child.start_kill()?;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!("ssh still running {:?} after SIGTERM, killing it", grace);
            child.kill().await?;
            child.wait().await
        }
    }
}

#[async_trait]
impl Tunnel for BastionSession {
    async fn start(&mut self, spec: BastionSpec, forwards: ForwardSet) -> Result<(), AccessError> {
        let current = self.state();
        if current != SessionState::New {
            return Err(AccessError::InvalidState(format!(
                "{current} and cannot be started again"
            )));
        }
        if spec.host.trim().is_empty() {
            return Err(AccessError::Config("bastion host is empty".to_string()));
        }
        if forwards.is_empty() {
            return Err(AccessError::Config(
                "a session needs at least one forward".to_string(),
            ));
        }

        let args = ssh_args(&spec, &forwards, self.options.connect_timeout);
        info!(
            "Connecting: {} {}",
            self.options.ssh_program.display(),
            args.join(" ")
        );
        self.forwards = forwards;
        self.set_state(SessionState::Starting);

        let mut command = Command::new(&self.options.ssh_program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        ignore_terminal_interrupt(&mut command);
        let child = command.spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                self.set_state(SessionState::Failed);
                return Err(AccessError::io(
                    format!("spawning {}", self.options.ssh_program.display()),
                    e,
                ));
            }
        };

        let pid = child.id();
        let close_token = CancellationToken::new();
        let handle = tokio::spawn(reap(
            child,
            close_token.clone(),
            self.options.termination_grace,
            self.state_tx.clone(),
        ));
        self.reaper = Some(Reaper {
            pid,
            close_token,
            handle,
        });

        info!("Waiting for {} forward(s)...", self.forwards.len());
        let deadline = Instant::now() + self.options.start_deadline;
        let ports = self.forwards.local_ports();
        let mut state_rx = self.state_tx.subscribe();
        let outcome = tokio::select! {
            ready = probe::wait_all_ready(&ports, deadline) => ready,
            _ = state_rx.wait_for(|s| *s == SessionState::Failed) => {
                Err(AccessError::StartupFailed { status: None })
            }
        };

        let failure = match outcome {
            Ok(()) if self.promote_to_ready() => {
                self.ready_at = Some(Utc::now());
                info!("Session {} ready (ssh pid {:?})", self.id, pid);
                return Ok(());
            }
            Ok(()) => AccessError::StartupFailed { status: None },
            Err(e) => e,
        };
        warn!("Session {} failed to start: {}", self.id, failure);
        Err(self.abort_startup(failure).await)
    }

    async fn close(&mut self) -> Result<(), AccessError> {
        let Some(reaper) = self.reaper.take() else {
            debug!("Session {} has no child to close ({})", self.id, self.state());
            return Ok(());
        };

        let closing = self.state_tx.send_if_modified(|s| {
            if matches!(s, SessionState::Starting | SessionState::Ready) {
                *s = SessionState::Closing;
                true
            } else {
                false
            }
        });

        reaper.close_token.cancel();
        let joined = reaper.handle.await;

        if closing {
            self.set_state(SessionState::Closed);
        }
        if let Some(ready_at) = self.ready_at {
            let uptime = Utc::now().signed_duration_since(ready_at);
            info!(
                "Session {} closed after {}s",
                self.id,
                uptime.num_seconds()
            );
        }

        match joined {
            Ok(Ok(status)) => {
                debug!("ssh reaped ({})", status);
                Ok(())
            }
            Ok(Err(e)) => Err(AccessError::io("waiting for ssh to exit", e)),
            Err(e) => Err(AccessError::io("joining the ssh reaper", io::Error::other(e))),
        }
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn forward(&self, name: ForwardName) -> Option<&Forward> {
        self.forwards.get(name)
    }
}

impl Drop for BastionSession {
    fn drop(&mut self) {
        // The reaper terminates the child; kill_on_drop covers a stopped runtime.
        if let Some(reaper) = self.reaper.take() {
            reaper.close_token.cancel();
        }
    }
}

/// Builds [`BastionSession`]s from the user's ssh configuration.
pub struct SshTunnelFactory {
    ssh_config: SshConfig,
    options: SessionOptions,
}

impl SshTunnelFactory {
    pub fn new(ssh_config: SshConfig, options: SessionOptions) -> Self {
        Self {
            ssh_config,
            options,
        }
    }
}

impl TunnelFactory for SshTunnelFactory {
    fn bastion_spec(&self, host: &str) -> Result<BastionSpec, AccessError> {
        self.ssh_config.bastion_spec(host)
    }

    fn create(&self) -> Box<dyn Tunnel> {
        Box::new(BastionSession::new(self.options.clone()))
    }
}
