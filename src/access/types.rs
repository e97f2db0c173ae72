//! Value types shared by the remote access components.
//!
//! Everything here is created per invocation and owned by whoever builds it;
//! nothing is persisted. Constructors enforce the invariants so the rest of
//! the crate can rely on them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::AccessError;

/// Loopback address every forward listens on.
pub const LOOPBACK: &str = "127.0.0.1";

/// A host name and TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint; the host must be non-empty and the port non-zero.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, AccessError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(AccessError::Config("endpoint host is empty".to_string()));
        }
        if port == 0 {
            return Err(AccessError::Config(format!("endpoint {host} has port 0")));
        }
        Ok(Self { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The fixed vocabulary of forward names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardName {
    /// The database the user wants a shell on.
    Target,
    /// The secret store holding the database credentials.
    Secrets,
}

impl fmt::Display for ForwardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardName::Target => write!(f, "target"),
            ForwardName::Secrets => write!(f, "secrets"),
        }
    }
}

/// A local loopback listener tunnelled to a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub name: ForwardName,
    pub local_port: u16,
    pub remote: Endpoint,
}

impl Forward {
    pub fn new(name: ForwardName, local_port: u16, remote: Endpoint) -> Self {
        Self {
            name,
            local_port,
            remote,
        }
    }

    /// The `-L` specification understood by ssh.
    pub fn ssh_spec(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            LOOPBACK, self.local_port, self.remote.host, self.remote.port
        )
    }
}

/// The forwards of one session, keyed by name.
///
/// Names are unique by construction; [`ForwardSet::insert`] additionally
/// rejects a second forward on an already used local port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardSet {
    forwards: BTreeMap<ForwardName, Forward>,
}

impl ForwardSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, forward: Forward) -> Result<(), AccessError> {
        if self.forwards.contains_key(&forward.name) {
            return Err(AccessError::Config(format!(
                "forward {} declared twice",
                forward.name
            )));
        }
        if let Some(existing) = self
            .forwards
            .values()
            .find(|f| f.local_port == forward.local_port)
        {
            return Err(AccessError::Config(format!(
                "forwards {} and {} share local port {}",
                existing.name, forward.name, forward.local_port
            )));
        }
        self.forwards.insert(forward.name, forward);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, forward: Forward) -> Result<Self, AccessError> {
        self.insert(forward)?;
        Ok(self)
    }

    pub fn get(&self, name: ForwardName) -> Option<&Forward> {
        self.forwards.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Forward> {
        self.forwards.values()
    }

    pub fn local_ports(&self) -> Vec<u16> {
        self.forwards.values().map(|f| f.local_port).collect()
    }

    pub fn len(&self) -> usize {
        self.forwards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }
}

/// Bastion connection parameters taken from the user's SSH configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BastionSpec {
    /// Host alias handed to ssh, so its own `HostName`/`ProxyJump` still apply.
    pub host: String,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Database credentials read from the secret store.
///
/// All three fields are non-empty once built through [`Credentials::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Credentials {
    /// Validate a fetched record. `path` names the secret for the error message.
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        database: Option<String>,
        path: &str,
    ) -> Result<Self, AccessError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        let missing: Vec<&str> = [
            ("username", present(&username)),
            ("password", present(&password)),
            ("database", present(&database)),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            return Err(AccessError::IncompleteSecret {
                path: path.to_string(),
                missing: missing.join(", "),
            });
        }

        Ok(Self {
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
            database: database.unwrap_or_default(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// What the instance lookup hands to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub endpoint_host: String,
    pub engine: String,
    pub bastion_host: String,
}

impl TargetDescriptor {
    /// Leading label of the endpoint host, used as the application name.
    pub fn application(&self) -> &str {
        application_name(&self.endpoint_host)
    }
}

pub fn application_name(endpoint_host: &str) -> &str {
    endpoint_host.split('.').next().unwrap_or(endpoint_host)
}

/// Lifecycle of a bastion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Starting,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::New => write!(f, "new"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}
