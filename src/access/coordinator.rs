//! The remote access coordinator: the one public `connect` operation.
//!
//! ## Sequence
//!
//! ```text
//! resolve   engine profile, bastion entry, secret store host, BastionSpec
//! allocate  two distinct local ports
//! tunnel    session.start(spec, {target, secrets})
//! creds     secret fetch (skipped when the configuration pins everything)
//! client    run the interactive client until it exits
//! cleanup   session.close(), on every path once a session exists
//! ```
//!
//! Resolution is pure, so an unknown engine or a missing bastion fails before
//! any port is probed. The allocation, tunnel and credential phases race the
//! interrupt token; the client phase does not, the client owns the terminal
//! and decides what an interrupt means.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{BastionEntry, Config, DatabaseOverride};
use super::engine::Engine;
use super::error::{AccessError, ConnectError, Phase};
use super::launcher::ClientRunner;
use super::port::PortAllocator;
use super::secrets::SecretFetcher;
use super::session::{Tunnel, TunnelFactory};
use super::types::{
    BastionSpec, Credentials, Endpoint, Forward, ForwardName, ForwardSet, TargetDescriptor,
};

/// Everything `connect` needs before touching the network.
struct Plan {
    engine: Engine,
    spec: BastionSpec,
    target_remote: Endpoint,
    secrets_remote: Endpoint,
    pinned: Option<DatabaseOverride>,
}

pub struct Coordinator {
    config: Arc<Config>,
    allocator: PortAllocator,
    tunnels: Arc<dyn TunnelFactory>,
    secrets: Arc<dyn SecretFetcher>,
    client: Arc<dyn ClientRunner>,
    interrupt: CancellationToken,
}

impl Coordinator {
    pub fn new(
        config: Arc<Config>,
        tunnels: Arc<dyn TunnelFactory>,
        secrets: Arc<dyn SecretFetcher>,
        client: Arc<dyn ClientRunner>,
    ) -> Self {
        Self {
            allocator: PortAllocator::new(config.port_range),
            config,
            tunnels,
            secrets,
            client,
            interrupt: CancellationToken::new(),
        }
    }

    /// Abort pre-launch phases when `interrupt` is cancelled.
    pub fn with_interrupt(mut self, interrupt: CancellationToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Open a client session on `target`.
    ///
    /// Returns `Ok(())` when the client exited with status 0. Any session that
    /// was created has been closed exactly once by the time this returns.
    pub async fn connect(
        &self,
        target: &TargetDescriptor,
        user_args: &[String],
    ) -> Result<(), ConnectError> {
        let plan = self
            .plan(target)
            .map_err(|e| ConnectError::new(Phase::Resolve, e))?;
        info!(
            "Connecting to {} ({} at {}) through {}",
            target.application(),
            plan.engine,
            target.endpoint_host,
            plan.spec.host
        );

        let ports = self
            .interruptible(Phase::Allocate, self.allocator.allocate_many(2))
            .await?;
        let (target_port, secrets_port) = (ports[0], ports[1]);
        let forwards = ForwardSet::new()
            .with(Forward::new(ForwardName::Target, target_port, plan.target_remote.clone()))
            .and_then(|set| {
                set.with(Forward::new(
                    ForwardName::Secrets,
                    secrets_port,
                    plan.secrets_remote.clone(),
                ))
            })
            .map_err(|e| ConnectError::new(Phase::Allocate, e))?;

        let mut session = self.tunnels.create();
        let outcome = self
            .drive(session.as_mut(), &plan, target, forwards, target_port, user_args)
            .await;
        let closed = session.close().await;

        match (outcome, closed) {
            (Ok(0), Ok(())) => {
                info!("Session finished");
                Ok(())
            }
            (Ok(code), Ok(())) => Err(ConnectError::new(
                Phase::Client,
                AccessError::ClientExitedNonzero(code),
            )),
            (Ok(code), Err(e)) => {
                warn!("Client exited with {} but the session did not close cleanly", code);
                Err(ConnectError::new(Phase::Cleanup, e))
            }
            (Err(e), closed) => {
                if let Err(close_error) = closed {
                    warn!("Closing the session after a failure also failed: {}", close_error);
                }
                Err(e)
            }
        }
    }

    fn plan(&self, target: &TargetDescriptor) -> Result<Plan, AccessError> {
        let engine: Engine = target.engine.parse()?;
        let entry = self.bastion_entry(target)?;
        let secrets_host = self.config.secret_store_host(entry);
        let spec = self.tunnels.bastion_spec(&target.bastion_host)?;

        Ok(Plan {
            engine,
            spec,
            target_remote: Endpoint::new(&target.endpoint_host, engine.profile().default_port)?,
            secrets_remote: Endpoint::new(
                secrets_host,
                self.config.secret_store.well_known_remote_port,
            )?,
            pinned: self.config.database_override(&target.endpoint_host).cloned(),
        })
    }

    /// The configured bastion entry behind `target.bastion_host`.
    fn bastion_entry(&self, target: &TargetDescriptor) -> Result<&BastionEntry, AccessError> {
        if let Ok(entry) = self.config.bastion_for(&target.endpoint_host)
            && entry.host == target.bastion_host
        {
            return Ok(entry);
        }
        self.config
            .bastion_hosts
            .iter()
            .find(|b| b.host == target.bastion_host)
            .ok_or_else(|| {
                AccessError::Config(format!(
                    "bastion {} is not in bastionHosts",
                    target.bastion_host
                ))
            })
    }

    async fn drive(
        &self,
        session: &mut dyn Tunnel,
        plan: &Plan,
        target: &TargetDescriptor,
        forwards: ForwardSet,
        target_port: u16,
        user_args: &[String],
    ) -> Result<i32, ConnectError> {
        self.interruptible(Phase::Tunnel, session.start(plan.spec.clone(), forwards))
            .await?;

        let credentials = match plan.pinned.as_ref().and_then(pinned_credentials) {
            Some(credentials) => {
                info!("Using credentials pinned in the configuration");
                credentials
            }
            None => {
                let fetched = self
                    .interruptible(
                        Phase::Credentials,
                        self.secrets.fetch_credentials(&*session, &target.endpoint_host),
                    )
                    .await?;
                match &plan.pinned {
                    Some(pinned) => apply_overrides(fetched, pinned),
                    None => fetched,
                }
            }
        };

        debug!("Handing the terminal to the {} client", plan.engine);
        self.client
            .run(plan.engine, &credentials, target_port, user_args)
            .await
            .map_err(|e| ConnectError::new(Phase::Client, e))
    }

    async fn interruptible<T>(
        &self,
        phase: Phase,
        work: impl Future<Output = Result<T, AccessError>>,
    ) -> Result<T, ConnectError> {
        tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => {
                warn!("Interrupted during {}", phase);
                Err(ConnectError::new(phase, AccessError::Interrupted))
            }
            result = work => result.map_err(|e| ConnectError::new(phase, e)),
        }
    }
}

/// Credentials fully pinned by configuration, if every field is set.
fn pinned_credentials(pinned: &DatabaseOverride) -> Option<Credentials> {
    Credentials::new(
        pinned.user.clone(),
        pinned.password.clone(),
        pinned.database.clone(),
        "configuration",
    )
    .ok()
}

fn apply_overrides(mut credentials: Credentials, pinned: &DatabaseOverride) -> Credentials {
    let set = |field: &Option<String>| field.clone().filter(|v| !v.is_empty());
    if let Some(user) = set(&pinned.user) {
        credentials.username = user;
    }
    if let Some(password) = set(&pinned.password) {
        credentials.password = password;
    }
    if let Some(database) = set(&pinned.database) {
        credentials.database = database;
    }
    credentials
}
