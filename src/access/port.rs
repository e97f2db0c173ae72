//! Local port allocation.
//!
//! A port is picked uniformly from the configured range and considered free
//! when a loopback connect to it is refused. The allocator never binds: the
//! ssh child has to bind the port itself, so a reservation here would race it.
//! A collision between allocation and the child's bind is tolerated; the ssh
//! child runs with `ExitOnForwardFailure` and the session fails loudly.

use std::ops::Range;
use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use tracing::debug;

use super::config::PortRange;
use super::error::{AccessError, is_not_listening};
use super::types::LOOPBACK;

/// Number of samples drawn before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 128;

/// Upper bound on a single in-use check.
const CHECK_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: Range<u16>,
    max_attempts: u32,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self {
            range: range.into(),
            max_attempts: MAX_ALLOCATION_ATTEMPTS,
        }
    }

    #[cfg(test)]
    fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Pick one port in the range that nothing accepts connections on.
    pub async fn allocate(&self) -> Result<u16, AccessError> {
        self.allocate_excluding(&[]).await
    }

    /// Pick `count` distinct free ports.
    pub async fn allocate_many(&self, count: usize) -> Result<Vec<u16>, AccessError> {
        let mut ports = Vec::with_capacity(count);
        for _ in 0..count {
            let port = self.allocate_excluding(&ports).await?;
            ports.push(port);
        }
        Ok(ports)
    }

    async fn allocate_excluding(&self, taken: &[u16]) -> Result<u16, AccessError> {
        for _ in 0..self.max_attempts {
            let port = rand::thread_rng().gen_range(self.range.clone());
            if taken.contains(&port) {
                continue;
            }
            if is_in_use(port).await {
                debug!("Port {} is in use, resampling", port);
                continue;
            }
            debug!("Allocated local port {}", port);
            return Ok(port);
        }
        Err(AccessError::NoPortAvailable {
            min: self.range.start,
            max: self.range.end,
            attempts: self.max_attempts,
        })
    }
}

/// A port counts as in use unless the connect is refused outright.
pub(crate) async fn is_in_use(port: u16) -> bool {
    match tokio::time::timeout(CHECK_TIMEOUT, TcpStream::connect((LOOPBACK, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => !is_not_listening(&e),
        Err(_) => true,
    }
}
