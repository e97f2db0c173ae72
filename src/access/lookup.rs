//! Target resolution from the instance catalog.
//!
//! The catalog is the `instances` list of the configuration. A filter keeps
//! the entries whose endpoint contains it; one survivor is used directly,
//! several go through an interactive picker.

use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use tracing::{debug, info};

use super::config::{Config, InstanceEntry};
use super::error::AccessError;
use super::types::{TargetDescriptor, application_name};

/// Turns a user filter into a target.
#[async_trait]
pub trait InstanceLookup: Send + Sync {
    async fn resolve(&self, filter: &str) -> Result<TargetDescriptor, AccessError>;
}

/// Describe `endpoint_host` with the bastion chosen by the configuration.
pub fn describe(
    config: &Config,
    endpoint_host: &str,
    engine: &str,
) -> Result<TargetDescriptor, AccessError> {
    let bastion = config.bastion_for(endpoint_host)?;
    Ok(TargetDescriptor {
        endpoint_host: endpoint_host.to_string(),
        engine: engine.to_string(),
        bastion_host: bastion.host.clone(),
    })
}

pub struct CatalogLookup {
    config: Arc<Config>,
}

impl CatalogLookup {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Entries whose endpoint contains `filter`, sorted by endpoint.
    pub fn candidates(&self, filter: &str) -> Vec<InstanceEntry> {
        let mut found: Vec<InstanceEntry> = self
            .config
            .instances
            .iter()
            .filter(|i| i.endpoint.contains(filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        found
    }
}

fn pick(candidates: Vec<InstanceEntry>) -> Result<InstanceEntry, AccessError> {
    let labels: Vec<String> = candidates
        .iter()
        .map(|i| match &i.region {
            Some(region) => format!("{} ({})", application_name(&i.endpoint), region),
            None => application_name(&i.endpoint).to_string(),
        })
        .collect();

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select an instance")
        .default(0)
        .items(&labels)
        .interact_opt()
        .map_err(|e| AccessError::Config(format!("instance picker failed: {e}")))?;

    match choice {
        Some(index) => candidates
            .into_iter()
            .nth(index)
            .ok_or_else(|| AccessError::Config(format!("no instance at index {index}"))),
        None => Err(AccessError::Interrupted),
    }
}

#[async_trait]
impl InstanceLookup for CatalogLookup {
    async fn resolve(&self, filter: &str) -> Result<TargetDescriptor, AccessError> {
        let mut candidates = self.candidates(filter);
        debug!("{} instance(s) match '{}'", candidates.len(), filter);

        let entry = match candidates.len() {
            0 => {
                return Err(AccessError::Config(format!(
                    "no instance matches '{filter}', check instances in the configuration"
                )));
            }
            1 => candidates.remove(0),
            _ => tokio::task::spawn_blocking(move || pick(candidates))
                .await
                .map_err(|e| AccessError::Config(format!("instance picker failed: {e}")))??,
        };

        info!("Selected {} ({})", entry.endpoint, entry.engine);
        describe(&self.config, &entry.endpoint, &entry.engine)
    }
}
