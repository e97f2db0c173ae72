#![deny(clippy::unwrap_used)]

//! Open database shells on private instances through an SSH bastion.
//!
//! The [`access`] module holds the remote-access core: port allocation,
//! readiness probing, the bastion SSH session, credential bootstrap from the
//! secret store, and the interactive client handoff. [`cli`] wires it to the
//! command line.

pub mod access;
pub mod cli;
