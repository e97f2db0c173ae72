//! Error taxonomy for the remote access layer.
//!
//! Every component returns [`AccessError`]. The coordinator wraps the first
//! failure it sees in a [`ConnectError`] tagged with the [`Phase`] that
//! produced it, so the CLI can print a single-line diagnostic.
//!
//! # Classification
//!
//! Two helpers classify low-level failures for the retry loops:
//!
//! 1. **Connect errors** ([`is_not_listening`]): a refused loopback connect
//!    means nobody listens on the port yet. Anything else is terminal for a
//!    readiness probe.
//!
//! 2. **Secret store statuses** ([`classify_status`]): `403` is the forbidden
//!    classification that triggers re-authentication; `400`/`401` are
//!    authentication denials; other non-success statuses are plain store
//!    errors.

use std::fmt;
use std::io;

/// Exit code reported for failures that happen before the client is launched.
pub const EXIT_PRE_LAUNCH_FAILURE: i32 = 125;

/// Exit code reported when the user interrupts a pre-launch phase.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// No matching bastion, unknown engine, missing SSH user configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The ssh child exited before every forward was ready.
    #[error("ssh exited{} before the forwards were ready", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    StartupFailed { status: Option<i32> },

    /// A forward did not accept connections before the deadline.
    #[error("forwarded port {port} was not ready within {seconds}s")]
    Timeout { port: u16, seconds: u64 },

    #[error("secret store authentication failed: {0}")]
    AuthFailed(String),

    #[error("secret at {path} is missing {missing}")]
    IncompleteSecret { path: String, missing: String },

    #[error("neither {primary} nor {fallback} was found on PATH")]
    ClientNotAvailable {
        primary: &'static str,
        fallback: &'static str,
    },

    #[error("client exited with status {0}")]
    ClientExitedNonzero(i32),

    #[error("interrupted")]
    Interrupted,

    #[error("no free local port in {min}..{max} after {attempts} attempts")]
    NoPortAvailable { min: u16, max: u16, attempts: u32 },

    #[error("forwarded port {port} cannot be probed: {source}")]
    Probe {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("session is {0}")]
    InvalidState(String),

    #[error("secret store error: {0}")]
    SecretStore(String),

    #[error("credential store error: {0}")]
    CredentialStore(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl AccessError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        AccessError::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AccessError::ClientExitedNonzero(code) => *code,
            AccessError::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_PRE_LAUNCH_FAILURE,
        }
    }
}

/// Step of `connect` during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Allocate,
    Tunnel,
    Credentials,
    Client,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Resolve => write!(f, "resolve"),
            Phase::Allocate => write!(f, "allocate"),
            Phase::Tunnel => write!(f, "tunnel"),
            Phase::Credentials => write!(f, "credentials"),
            Phase::Client => write!(f, "client"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// A failed `connect`, tagged with the phase that failed.
#[derive(Debug, thiserror::Error)]
#[error("{phase}: {source}")]
pub struct ConnectError {
    pub phase: Phase,
    #[source]
    pub source: AccessError,
}

impl ConnectError {
    pub fn new(phase: Phase, source: AccessError) -> Self {
        Self { phase, source }
    }

    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}

/// Returns true when a loopback connect failed because nothing listens yet.
pub(crate) fn is_not_listening(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ConnectionRefused
}

/// How the secret store answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    /// Token rejected; worth one re-authentication.
    Forbidden,
    /// Login credentials rejected.
    Denied,
    Other,
}

pub(crate) fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        403 => StatusClass::Forbidden,
        400 | 401 => StatusClass::Denied,
        _ => StatusClass::Other,
    }
}
