//! Bastion session management.
//!
//! A session owns one ssh child process that carries every local forward the
//! coordinator asks for. The [`Tunnel`] trait is the seam the coordinator
//! talks to; [`BastionSession`] is the ssh-backed implementation.

mod bastion;
mod traits;

pub use bastion::{BastionSession, DEFAULT_TERMINATION_GRACE, SessionOptions, SshTunnelFactory};
pub use traits::{Tunnel, TunnelFactory};
