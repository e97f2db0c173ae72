//! Configuration tree for the remote access layer.
//!
//! Configuration is read from two YAML files in the per-user config directory:
//!
//! 1. `shared.yml` - team-wide settings, optional
//! 2. `config.yml` - the user's own settings, optional, wins on conflict
//!
//! Mappings are merged recursively; any other value in `config.yml` replaces
//! the shared one.
//!
//! Runtime knobs then resolve with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (command-line flag)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Configuration** - Value from the YAML tree or its built-in default
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `JUMPDB_CONFIG_DIR` | `<config dir>/jumpdb` | Directory holding the YAML files and token cache |
//! | `JUMPDB_SESSION_START_DEADLINE` | 30s | Time allowed for every forward to become ready |
//! | `JUMPDB_CONNECT_TIMEOUT` | 3s | ssh `ConnectTimeout` towards the bastion |
//! | `JUMPDB_SSH_PROGRAM` | `ssh` | ssh binary used for the bastion session |
//! | `JUMPDB_UPDATE_CREDENTIALS` | unset | Re-prompt for the secret store credentials |

use std::env;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use super::error::AccessError;

/// Default lower bound of the local port range (inclusive)
pub const DEFAULT_PORT_MIN: u16 = 40000;

/// Default upper bound of the local port range (exclusive)
pub const DEFAULT_PORT_MAX: u16 = 60000;

/// Default time allowed for a session to become ready, in seconds
pub const DEFAULT_SESSION_START_DEADLINE_SECS: u64 = 30;

/// Default ssh connect timeout, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Well-known port of the secret store on the remote side
pub const DEFAULT_SECRET_STORE_PORT: u16 = 8200;

pub const DEFAULT_AUTH_METHOD: &str = "okta";

pub const DEFAULT_SECRET_STORE_NAME: &str = "vault";

pub const DEFAULT_SECRET_BASE_PATH: &str = "secret";

pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

const REDACTED: &str = "<redacted>";

pub const USER_CONFIG_FILE: &str = "config.yml";

pub const SHARED_CONFIG_FILE: &str = "shared.yml";

pub(crate) const CONFIG_DIR_ENV_VAR: &str = "JUMPDB_CONFIG_DIR";

pub(crate) const START_DEADLINE_ENV_VAR: &str = "JUMPDB_SESSION_START_DEADLINE";

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "JUMPDB_CONNECT_TIMEOUT";

pub(crate) const SSH_PROGRAM_ENV_VAR: &str = "JUMPDB_SSH_PROGRAM";

pub(crate) const UPDATE_CREDENTIALS_ENV_VAR: &str = "JUMPDB_UPDATE_CREDENTIALS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Bastion selection rules; the first prefix match wins.
    #[serde(default)]
    pub bastion_hosts: Vec<BastionEntry>,
    #[serde(default)]
    pub port_range: PortRange,
    #[serde(default = "default_start_deadline")]
    pub session_start_deadline_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub client_connect_timeout_seconds: u64,
    #[serde(default)]
    pub secret_store: SecretStoreConfig,
    /// Credentials pinned in configuration instead of the secret store.
    #[serde(default)]
    pub databases: Vec<DatabaseOverride>,
    /// Catalog of known database instances.
    #[serde(default)]
    pub instances: Vec<InstanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BastionEntry {
    /// Endpoint host prefix; an entry without one is the catch-all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_match: Option<String>,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store_host: Option<String>,
}

impl BastionEntry {
    fn prefix(&self) -> Option<&str> {
        self.prefix_match.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_PORT_MIN,
            max: DEFAULT_PORT_MAX,
        }
    }
}

impl From<PortRange> for Range<u16> {
    fn from(range: PortRange) -> Self {
        range.min..range.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreConfig {
    /// Only the scheme is used; traffic always goes through the forward.
    #[serde(rename = "serverBaseURL", default)]
    pub server_base_url: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    #[serde(default = "default_secret_store_port")]
    pub well_known_remote_port: u16,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Logical name keying the token cache; defaults to the forward's remote host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            server_base_url: String::new(),
            auth_method: default_auth_method(),
            well_known_remote_port: DEFAULT_SECRET_STORE_PORT,
            base_path: default_base_path(),
            name: None,
        }
    }
}

impl SecretStoreConfig {
    /// URL scheme to talk to the store with, `https` unless configured otherwise.
    pub fn scheme(&self) -> String {
        reqwest::Url::parse(&self.server_base_url)
            .map(|url| url.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOverride {
    pub prefix_match: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceEntry {
    pub endpoint: String,
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

fn default_start_deadline() -> u64 {
    DEFAULT_SESSION_START_DEADLINE_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_auth_method() -> String {
    DEFAULT_AUTH_METHOD.to_string()
}

fn default_secret_store_port() -> u16 {
    DEFAULT_SECRET_STORE_PORT
}

fn default_base_path() -> String {
    DEFAULT_SECRET_BASE_PATH.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bastion_hosts: Vec::new(),
            port_range: PortRange::default(),
            session_start_deadline_seconds: DEFAULT_SESSION_START_DEADLINE_SECS,
            client_connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
            secret_store: SecretStoreConfig::default(),
            databases: Vec::new(),
            instances: Vec::new(),
        }
    }
}

impl Config {
    /// Load and merge `shared.yml` and `config.yml` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, AccessError> {
        let mut merged = Value::Mapping(Default::default());
        for file in [SHARED_CONFIG_FILE, USER_CONFIG_FILE] {
            let path = dir.join(file);
            if !path.exists() {
                debug!("No configuration at {}", path.display());
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .map_err(|e| AccessError::io(format!("reading {}", path.display()), e))?;
            let layer: Value = serde_yaml::from_str(&text)
                .map_err(|e| AccessError::Config(format!("{}: {}", path.display(), e)))?;
            merge_yaml(&mut merged, layer);
        }
        Self::from_value(merged)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AccessError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| AccessError::Config(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, AccessError> {
        let config: Config = if value.is_null() {
            Config::default()
        } else {
            serde_yaml::from_value(value).map_err(|e| AccessError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AccessError> {
        if self.port_range.min == 0 || self.port_range.min >= self.port_range.max {
            return Err(AccessError::Config(format!(
                "invalid portRange {}..{}",
                self.port_range.min, self.port_range.max
            )));
        }
        if let Some(entry) = self.bastion_hosts.iter().find(|b| b.host.trim().is_empty()) {
            return Err(AccessError::Config(format!(
                "bastion entry {:?} has an empty host",
                entry.prefix_match
            )));
        }
        Ok(())
    }

    /// A copy safe to display: pinned passwords are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for pinned in &mut copy.databases {
            if pinned.password.is_some() {
                pinned.password = Some(REDACTED.to_string());
            }
        }
        copy
    }

    pub fn to_yaml(&self) -> Result<String, AccessError> {
        serde_yaml::to_string(self).map_err(|e| AccessError::Config(e.to_string()))
    }

    /// Pick the bastion entry for an endpoint host.
    ///
    /// The first entry whose `prefixMatch` prefixes the host wins; otherwise
    /// the first entry without a prefix; otherwise a configuration error.
    pub fn bastion_for(&self, endpoint_host: &str) -> Result<&BastionEntry, AccessError> {
        self.bastion_hosts
            .iter()
            .find(|b| b.prefix().is_some_and(|p| endpoint_host.starts_with(p)))
            .or_else(|| self.bastion_hosts.iter().find(|b| b.prefix().is_none()))
            .ok_or_else(|| {
                AccessError::Config(format!(
                    "no bastion configured for {endpoint_host}, check bastionHosts"
                ))
            })
    }

    /// Host of the secret store reachable from `entry`'s bastion.
    ///
    /// Uses `secretStoreHost` when set, otherwise
    /// `{name}.{prefix}.{bastion domain}` (prefix omitted for the catch-all).
    pub fn secret_store_host(&self, entry: &BastionEntry) -> String {
        if let Some(host) = entry.secret_store_host.as_deref().filter(|h| !h.is_empty()) {
            return host.to_string();
        }
        let name = self
            .secret_store
            .name
            .as_deref()
            .and_then(|n| n.split('.').next())
            .unwrap_or(DEFAULT_SECRET_STORE_NAME);
        let domain = entry
            .host
            .split_once('.')
            .map(|(_, rest)| rest)
            .unwrap_or(entry.host.as_str());
        match entry.prefix() {
            Some(prefix) => format!("{name}.{prefix}.{domain}"),
            None => format!("{name}.{domain}"),
        }
    }

    pub fn database_override(&self, endpoint_host: &str) -> Option<&DatabaseOverride> {
        self.databases
            .iter()
            .find(|d| !d.prefix_match.is_empty() && endpoint_host.starts_with(&d.prefix_match))
    }

    /// Resolve the session start deadline: parameter -> env var -> configuration.
    pub fn resolve_start_deadline(&self, param: Option<u64>) -> Duration {
        Duration::from_secs(resolve_u64(
            param,
            START_DEADLINE_ENV_VAR,
            self.session_start_deadline_seconds,
        ))
    }

    /// Resolve the ssh connect timeout: parameter -> env var -> configuration.
    pub fn resolve_connect_timeout(&self, param: Option<u64>) -> Duration {
        Duration::from_secs(resolve_u64(
            param,
            CONNECT_TIMEOUT_ENV_VAR,
            self.client_connect_timeout_seconds,
        ))
    }
}

fn resolve_u64(param: Option<u64>, env_var: &str, fallback: u64) -> u64 {
    // Priority 1: Use parameter if provided
    if let Some(value) = param {
        return value;
    }

    // Priority 2: Use environment variable if set
    if let Ok(env_value) = env::var(env_var)
        && let Ok(value) = env_value.parse::<u64>()
    {
        return value;
    }

    // Priority 3: Configuration value
    fallback
}

/// Resolve the ssh program: parameter -> env var -> `ssh`.
pub fn resolve_ssh_program(param: Option<PathBuf>) -> PathBuf {
    if let Some(program) = param {
        return program;
    }
    match env::var(SSH_PROGRAM_ENV_VAR) {
        Ok(program) if !program.is_empty() => PathBuf::from(program),
        _ => PathBuf::from(DEFAULT_SSH_PROGRAM),
    }
}

/// Whether the user asked to re-enter the secret store credentials.
pub fn resolve_update_credentials(param: bool) -> bool {
    param || env::var(UPDATE_CREDENTIALS_ENV_VAR).is_ok_and(|v| !v.is_empty())
}

/// Directory holding configuration and the token cache.
pub fn config_dir() -> Result<PathBuf, AccessError> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV_VAR)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("jumpdb"))
        .ok_or_else(|| AccessError::Config("cannot determine the config directory".to_string()))
}

fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex as StdMutex;

    // Use a mutex to serialize env var tests to avoid race conditions
    pub(crate) static ENV_TEST_MUTEX: Lazy<StdMutex<()>> = Lazy::new(|| StdMutex::new(()));

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::set_var(key, value) };
    }

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX to prevent data races.
    unsafe fn remove_env(key: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::remove_var(key) };
    }

    const SAMPLE: &str = r#"
bastionHosts:
  - prefixMatch: staging2
    host: jump.staging2.example.com
  - prefixMatch: staging
    host: jump.example.com
    region: us-west-2
  - host: jump.prod.example.com
secretStore:
  serverBaseURL: https://vault.example.com
  basePath: secret/tool
databases:
  - prefixMatch: legacy-
    database: legacy
instances:
  - endpoint: staging-accounts.db.example.com
    engine: postgres
"#;

    fn sample() -> Config {
        Config::from_yaml(SAMPLE).unwrap()
    }

    mod loading {
        use super::*;

        #[test]
        fn test_defaults_for_empty_document() {
            let config = Config::from_yaml("").unwrap();
            assert_eq!(config.port_range, PortRange { min: 40000, max: 60000 });
            assert_eq!(config.session_start_deadline_seconds, 30);
            assert_eq!(config.client_connect_timeout_seconds, 3);
            assert_eq!(config.secret_store.well_known_remote_port, 8200);
            assert_eq!(config.secret_store.auth_method, "okta");
            assert_eq!(config.secret_store.scheme(), "https");
        }

        #[test]
        fn test_sample_parses() {
            let config = sample();
            assert_eq!(config.bastion_hosts.len(), 3);
            assert_eq!(config.secret_store.base_path, "secret/tool");
            assert_eq!(config.instances[0].engine, "postgres");
        }

        #[test]
        fn test_rejects_inverted_port_range() {
            let result = Config::from_yaml("portRange: {min: 50000, max: 40000}");
            assert!(matches!(result, Err(AccessError::Config(_))));
        }

        #[test]
        fn test_rejects_empty_bastion_host() {
            let result = Config::from_yaml("bastionHosts: [{prefixMatch: x, host: ''}]");
            assert!(result.is_err());
        }

        #[test]
        fn test_user_file_overrides_shared_file() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join(SHARED_CONFIG_FILE),
                "sessionStartDeadlineSeconds: 10\nsecretStore:\n  basePath: secret/shared\n  authMethod: ldap\n",
            )
            .unwrap();
            std::fs::write(
                dir.path().join(USER_CONFIG_FILE),
                "secretStore:\n  basePath: secret/mine\n",
            )
            .unwrap();

            let config = Config::load(dir.path()).unwrap();
            assert_eq!(config.session_start_deadline_seconds, 10);
            assert_eq!(config.secret_store.base_path, "secret/mine");
            assert_eq!(config.secret_store.auth_method, "ldap");
        }

        #[test]
        fn test_missing_files_yield_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::load(dir.path()).unwrap();
            assert!(config.bastion_hosts.is_empty());
        }

        #[test]
        fn test_round_trips_through_yaml() {
            let text = sample().to_yaml().unwrap();
            assert!(text.contains("serverBaseURL"));
            assert!(Config::from_yaml(&text).is_ok());
        }
    }

    mod bastion_selection {
        use super::*;

        #[test]
        fn test_first_prefix_match_wins() {
            let config = sample();
            let entry = config.bastion_for("staging2-billing.db.example.com").unwrap();
            assert_eq!(entry.host, "jump.staging2.example.com");
            let entry = config.bastion_for("staging-accounts.db.example.com").unwrap();
            assert_eq!(entry.host, "jump.example.com");
        }

        #[test]
        fn test_catch_all_when_nothing_matches() {
            let config = sample();
            let entry = config.bastion_for("prod-accounts.db.example.com").unwrap();
            assert_eq!(entry.host, "jump.prod.example.com");
        }

        #[test]
        fn test_no_match_without_catch_all_is_config_error() {
            let config =
                Config::from_yaml("bastionHosts: [{prefixMatch: staging, host: jump.example.com}]")
                    .unwrap();
            assert!(matches!(
                config.bastion_for("prod-accounts.db.example.com"),
                Err(AccessError::Config(_))
            ));
        }

        #[test]
        fn test_derived_secret_store_host() {
            let config = sample();
            let entry = config.bastion_for("staging-accounts.db.example.com").unwrap();
            assert_eq!(config.secret_store_host(entry), "vault.staging.example.com");
            let catch_all = config.bastion_for("prod-x.db.example.com").unwrap();
            assert_eq!(config.secret_store_host(catch_all), "vault.prod.example.com");
        }

        #[test]
        fn test_explicit_secret_store_host() {
            let config = Config::from_yaml(
                "bastionHosts: [{host: jump.example.com, secretStoreHost: secrets.internal}]",
            )
            .unwrap();
            let entry = config.bastion_for("anything").unwrap();
            assert_eq!(config.secret_store_host(entry), "secrets.internal");
        }

        #[test]
        fn test_database_override_by_prefix() {
            let config = sample();
            let pinned = config.database_override("legacy-orders.db.example.com").unwrap();
            assert_eq!(pinned.database.as_deref(), Some("legacy"));
            assert!(config.database_override("staging-accounts").is_none());
        }

        #[test]
        fn test_redacted_masks_only_passwords() {
            let config = Config::from_yaml(
                "databases:\n  - {prefixMatch: legacy, user: rw, password: p@ss}\n  - {prefixMatch: other, database: x}\n",
            )
            .unwrap();
            let shown = config.redacted();
            assert_eq!(shown.databases[0].password.as_deref(), Some("<redacted>"));
            assert_eq!(shown.databases[0].user.as_deref(), Some("rw"));
            assert_eq!(shown.databases[1].password, None);
            assert_eq!(config.databases[0].password.as_deref(), Some("p@ss"));
        }
    }

    mod resolution {
        use super::*;

        #[test]
        fn test_param_takes_priority_over_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(START_DEADLINE_ENV_VAR, "90");
            }
            let result = Config::default().resolve_start_deadline(Some(5));
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(START_DEADLINE_ENV_VAR);
            }
            assert_eq!(result, Duration::from_secs(5));
        }

        #[test]
        fn test_env_overrides_configuration() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(CONNECT_TIMEOUT_ENV_VAR, "9");
            }
            let result = Config::default().resolve_connect_timeout(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(CONNECT_TIMEOUT_ENV_VAR);
            }
            assert_eq!(result, Duration::from_secs(9));
        }

        #[test]
        fn test_ignores_invalid_env_var() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(START_DEADLINE_ENV_VAR, "soon");
            }
            let result = Config::default().resolve_start_deadline(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(START_DEADLINE_ENV_VAR);
            }
            assert_eq!(result, Duration::from_secs(DEFAULT_SESSION_START_DEADLINE_SECS));
        }

        #[test]
        fn test_ssh_program_default_and_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(SSH_PROGRAM_ENV_VAR);
            }
            assert_eq!(resolve_ssh_program(None), PathBuf::from("ssh"));
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(SSH_PROGRAM_ENV_VAR, "/opt/ssh");
            }
            let from_env = resolve_ssh_program(None);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(SSH_PROGRAM_ENV_VAR);
            }
            assert_eq!(from_env, PathBuf::from("/opt/ssh"));
        }

        #[test]
        fn test_update_credentials_flag() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(UPDATE_CREDENTIALS_ENV_VAR);
            }
            assert!(!resolve_update_credentials(false));
            assert!(resolve_update_credentials(true));
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(UPDATE_CREDENTIALS_ENV_VAR, "1");
            }
            let from_env = resolve_update_credentials(false);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(UPDATE_CREDENTIALS_ENV_VAR);
            }
            assert!(from_env);
        }
    }
}
