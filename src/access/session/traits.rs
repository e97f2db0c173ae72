//! Session trait definitions.
//!
//! These traits put a seam between the coordinator and the ssh child process,
//! enabling dependency injection and testability through fakes.

use async_trait::async_trait;

use crate::access::error::AccessError;
use crate::access::types::{BastionSpec, Forward, ForwardName, ForwardSet, SessionState};

/// One connection to a bastion carrying a set of local forwards.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Open the connection and wait until every forward accepts connections.
    ///
    /// # Errors
    ///
    /// * `StartupFailed` - the connection ended before the forwards were ready
    /// * `Timeout` - a forward was not ready within the deadline
    /// * `Config` - the bastion description is unusable
    async fn start(&mut self, spec: BastionSpec, forwards: ForwardSet) -> Result<(), AccessError>;

    /// Tear the connection down. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), AccessError>;

    fn state(&self) -> SessionState;

    /// Look up a forward declared at `start`.
    fn forward(&self, name: ForwardName) -> Option<&Forward>;
}

/// Creates tunnels and describes bastions for the coordinator.
pub trait TunnelFactory: Send + Sync {
    /// Resolve the bastion description for `host`.
    fn bastion_spec(&self, host: &str) -> Result<BastionSpec, AccessError>;

    /// A fresh tunnel in the `New` state.
    fn create(&self) -> Box<dyn Tunnel>;
}
