//! Readiness probing of forwarded local ports.
//!
//! A forward is ready once `127.0.0.1:port` accepts a TCP connection. Probes
//! run every [`POLL_INTERVAL`] via a constant `backon` schedule:
//!
//! - **Refused**: nothing listens yet, probe again
//! - **Accepted**: ready
//! - **Any other error**: terminal, surfaced as [`AccessError::Probe`]
//!
//! Several ports are probed concurrently; readiness is the AND of all of them
//! and the first failure wins.

use std::future::Future;
use std::io;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use futures::future::try_join_all;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use super::error::{AccessError, is_not_listening};
use super::types::LOOPBACK;

/// Delay between two probes of the same port.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
enum ProbeError {
    NotYet,
    Terminal(io::Error),
}

/// Refused means nothing listens yet; anything else ends the wait.
fn classify(error: io::Error) -> ProbeError {
    if is_not_listening(&error) {
        ProbeError::NotYet
    } else {
        ProbeError::Terminal(error)
    }
}

async fn probe_once(port: u16) -> io::Result<()> {
    TcpStream::connect((LOOPBACK, port)).await.map(drop)
}

/// Wait until `port` accepts connections or `deadline` passes.
pub async fn wait_ready(port: u16, deadline: Instant) -> Result<(), AccessError> {
    wait_ready_with(port, deadline, probe_once).await
}

async fn wait_ready_with<F, Fut>(
    port: u16,
    deadline: Instant,
    connect: F,
) -> Result<(), AccessError>
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let budget = deadline.saturating_duration_since(Instant::now());
    let timeout_error = || AccessError::Timeout {
        port,
        seconds: budget.as_secs_f64().ceil() as u64,
    };

    // One attempt per interval fits in the budget, plus the immediate first one.
    let max_times = (budget.as_millis() / POLL_INTERVAL.as_millis()) as usize + 1;
    let backoff = ConstantBuilder::default()
        .with_delay(POLL_INTERVAL)
        .with_max_times(max_times);

    let probing = (|| async { connect(port).await.map_err(classify) })
        .retry(backoff)
        .when(|e| matches!(e, ProbeError::NotYet));

    match tokio::time::timeout_at(deadline, probing).await {
        Ok(Ok(())) => {
            debug!("Forwarded port {} is accepting connections", port);
            Ok(())
        }
        Ok(Err(ProbeError::Terminal(source))) => Err(AccessError::Probe { port, source }),
        Ok(Err(ProbeError::NotYet)) | Err(_) => Err(timeout_error()),
    }
}

/// Wait until every port is ready; fails on the first port that fails.
pub async fn wait_all_ready(ports: &[u16], deadline: Instant) -> Result<(), AccessError> {
    try_join_all(ports.iter().map(|&port| wait_ready(port, deadline))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::port::PortAllocator;
    use crate::access::config::PortRange;
    use tokio::net::TcpListener;

    async fn free_port() -> u16 {
        PortAllocator::new(PortRange::default())
            .allocate()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ready_when_listening() {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let deadline = Instant::now() + Duration::from_secs(2);
        wait_ready(port, deadline).await.unwrap();
    }

    #[tokio::test]
    async fn test_times_out_when_nobody_listens() {
        let port = free_port().await;
        let deadline = Instant::now() + Duration::from_millis(150);
        let result = wait_ready(port, deadline).await;
        assert!(matches!(result, Err(AccessError::Timeout { port: p, .. }) if p == port));
    }

    #[tokio::test]
    async fn test_becomes_ready_after_late_bind() {
        let port = free_port().await;
        let deadline = Instant::now() + Duration::from_secs(5);

        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = TcpListener::bind((LOOPBACK, port)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(listener);
        });

        wait_ready(port, deadline).await.unwrap();
        binder.await.unwrap();
    }

    #[tokio::test]
    async fn test_all_ready_requires_every_port() {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = free_port().await;
        let deadline = Instant::now() + Duration::from_millis(150);

        let result = wait_all_ready(&[open, closed], deadline).await;
        assert!(matches!(result, Err(AccessError::Timeout { port, .. }) if port == closed));
    }

    #[test]
    fn test_only_refused_is_retried() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(classify(refused), ProbeError::NotYet));
        for kind in [io::ErrorKind::PermissionDenied, io::ErrorKind::NetworkUnreachable] {
            assert!(matches!(
                classify(io::Error::from(kind)),
                ProbeError::Terminal(e) if e.kind() == kind
            ));
        }
    }

    #[tokio::test]
    async fn test_other_connect_errors_are_surfaced() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let started = Instant::now();
        let result = wait_ready_with(41000, deadline, |_| async {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .await;
        match result {
            Err(AccessError::Probe { port, source }) => {
                assert_eq!(port, 41000);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected Probe, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_refused_then_accepted() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        wait_ready_with(41000, deadline, |_| {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(io::Error::from(io::ErrorKind::ConnectionRefused))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_all_ready_with_every_port_open() {
        let a = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let b = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let ports = [a.local_addr().unwrap().port(), b.local_addr().unwrap().port()];
        let deadline = Instant::now() + Duration::from_secs(2);
        wait_all_ready(&ports, deadline).await.unwrap();
    }
}
