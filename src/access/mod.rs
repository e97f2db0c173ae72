//! Remote access layer: reach internal databases through a bastion host.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Value types shared by every component (endpoints, forwards, credentials)
//! - `engine`: Static per-engine parameters (default port, client binaries)
//! - `config`: Configuration tree with environment variable overrides
//! - `error`: Error taxonomy and phase-tagged connect failures
//! - `port`: Local port allocation
//! - `probe`: Readiness probing of forwarded ports
//! - `ssh_config`: Bastion lookup in the user's SSH configuration
//! - `session`: The SSH child process carrying the local forwards
//! - `credentials`: Credential provider for the secret store's own login
//! - `secrets`: Database credential fetch through the secrets forward
//! - `launcher`: Interactive database client handoff
//! - `lookup`: Target resolution from the instance catalog
//! - `coordinator`: The public `connect` operation

pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod lookup;
pub mod port;
pub mod probe;
pub mod secrets;
pub mod session;
pub mod ssh_config;
pub mod types;

pub use coordinator::Coordinator;
pub use error::{AccessError, ConnectError, Phase};
pub use types::{Credentials, Endpoint, Forward, ForwardName, ForwardSet, TargetDescriptor};
