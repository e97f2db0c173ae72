//! Vault secret fetcher over the session's `secrets` forward.
//!
//! ## Flow
//!
//! 1. Load the cached token, if any
//! 2. Without a token, log in (`POST /v1/auth/<method>/login/<user>`) with the
//!    credentials from the [`CredentialProvider`] and cache the new token
//! 3. Read `GET /v1/<basePath>/db/<application>` with `X-Vault-Token`
//!
//! A read answered with 403 drops the token, in memory and on disk, and goes
//! back to step 2, at most
//! [`MAX_REAUTHENTICATIONS`] times. The schedule is a zero-delay constant
//! `backon` builder; nothing waits between attempts.
//!
//! ## Transport
//!
//! Requests target `<scheme>://<store host>:<local port>` and the store host is
//! pinned to `127.0.0.1` in the client's resolver, so TLS still verifies the
//! real host name while the bytes go through the tunnel.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::token::TokenCache;
use super::traits::SecretFetcher;
use crate::access::config::{SecretStoreConfig, UPDATE_CREDENTIALS_ENV_VAR};
use crate::access::credentials::CredentialProvider;
use crate::access::error::{AccessError, StatusClass, classify_status};
use crate::access::session::Tunnel;
use crate::access::types::{Credentials, Forward, ForwardName, LOOPBACK, application_name};

/// Re-authentications allowed for one read after a forbidden answer
pub const MAX_REAUTHENTICATIONS: usize = 2;

const TOKEN_HEADER: &str = "X-Vault-Token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct VaultFetcher {
    config: SecretStoreConfig,
    cache_dir: PathBuf,
    credentials: Arc<dyn CredentialProvider>,
}

enum ReadError {
    Forbidden,
    Failed(AccessError),
}

impl From<AccessError> for ReadError {
    fn from(error: AccessError) -> Self {
        ReadError::Failed(error)
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl VaultFetcher {
    pub fn new(
        config: SecretStoreConfig,
        cache_dir: PathBuf,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            cache_dir,
            credentials,
        }
    }

    /// Path of the secret holding the credentials of `endpoint_host`.
    pub fn secret_path(&self, endpoint_host: &str) -> String {
        format!(
            "{}/db/{}",
            self.config.base_path.trim_matches('/'),
            application_name(endpoint_host)
        )
    }

    /// Keyring labels for the login, e.g. `Vault Okta Username`.
    pub fn login_labels(&self) -> (String, String) {
        let method = capitalize(&self.config.auth_method);
        (
            format!("Vault {method} Username"),
            format!("Vault {method} Password"),
        )
    }

    fn logical_name(&self, forward: &Forward) -> String {
        self.config
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| forward.remote.host.clone())
    }

    async fn login_credentials(&self) -> Result<(String, String), AccessError> {
        let provider = Arc::clone(&self.credentials);
        let (user_label, password_label) = self.login_labels();
        debug!("Loading secret store credentials via {}", provider.name());
        tokio::task::spawn_blocking(move || -> Result<(String, String), AccessError> {
            Ok((provider.resolve(&user_label)?, provider.resolve(&password_label)?))
        })
        .await
        .map_err(|e| AccessError::CredentialStore(e.to_string()))?
    }

    async fn authenticate(
        &self,
        client: &VaultClient,
        cache: &TokenCache,
    ) -> Result<String, AccessError> {
        let (username, password) = self.login_credentials().await?;
        info!(
            "Authenticating to the secret store as {} ({})",
            username, self.config.auth_method
        );
        let token = client
            .login(&self.config.auth_method, &username, &password)
            .await?;
        cache.store(&token)?;
        Ok(token)
    }

    async fn read_with_reauth(
        &self,
        client: &VaultClient,
        cache: &TokenCache,
        path: &str,
    ) -> Result<Value, AccessError> {
        let token = Mutex::new(cache.load()?);
        let reauthentications = AtomicU32::new(0);

        let backoff = ConstantBuilder::default()
            .with_delay(Duration::ZERO)
            .with_max_times(MAX_REAUTHENTICATIONS);

        let result = (|| async {
            let current = {
                let mut guard = token.lock().await;
                match guard.as_ref() {
                    Some(cached) => cached.clone(),
                    None => {
                        let fresh = self.authenticate(client, cache).await?;
                        *guard = Some(fresh.clone());
                        fresh
                    }
                }
            };
            match client.read(path, &current).await {
                Err(ReadError::Forbidden) => {
                    *token.lock().await = None;
                    cache.clear()?;
                    Err(ReadError::Forbidden)
                }
                other => other,
            }
        })
        .retry(backoff)
        .when(|e| matches!(e, ReadError::Forbidden))
        .notify(|_, _| {
            reauthentications.fetch_add(1, Ordering::SeqCst);
            warn!("Secret store token rejected, re-authenticating");
        })
        .await;

        let count = reauthentications.load(Ordering::SeqCst);
        match result {
            Ok(body) => {
                if count > 0 {
                    info!("Secret read succeeded after {} re-authentication(s)", count);
                }
                Ok(body)
            }
            Err(ReadError::Forbidden) => Err(AccessError::AuthFailed(format!(
                "reading {path} is still forbidden after {count} re-authentication(s)"
            ))),
            Err(ReadError::Failed(e)) => Err(e),
        }
    }
}

#[async_trait]
impl SecretFetcher for VaultFetcher {
    async fn fetch_credentials(
        &self,
        session: &dyn Tunnel,
        endpoint_host: &str,
    ) -> Result<Credentials, AccessError> {
        let forward = session.forward(ForwardName::Secrets).cloned().ok_or_else(|| {
            AccessError::InvalidState("missing its secrets forward".to_string())
        })?;

        let client = VaultClient::connect(&self.config.scheme(), &forward)?;
        let cache = TokenCache::new(&self.cache_dir, &self.logical_name(&forward));
        let path = self.secret_path(endpoint_host);

        info!("Fetching credentials from the secret store ({})...", path);
        let body = self.read_with_reauth(&client, &cache, &path).await?;

        Credentials::new(
            secret_field(&body, "username"),
            secret_field(&body, "password"),
            secret_field(&body, "database"),
            &path,
        )
    }
}

struct VaultClient {
    http: reqwest::Client,
    base_url: Url,
}

impl VaultClient {
    fn connect(scheme: &str, forward: &Forward) -> Result<Self, AccessError> {
        let host = forward.remote.host.as_str();
        let port = forward.local_port;

        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .no_proxy();
        let url_host = if host.parse::<IpAddr>().is_ok() {
            LOOPBACK
        } else {
            builder = builder.resolve(host, SocketAddr::from(([127, 0, 0, 1], port)));
            host
        };

        let http = builder
            .build()
            .map_err(|e| AccessError::SecretStore(format!("building the HTTP client: {e}")))?;
        let base_url = Url::parse(&format!("{scheme}://{url_host}:{port}/"))
            .map_err(|e| AccessError::Config(format!("secret store URL: {e}")))?;

        Ok(Self { http, base_url })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, AccessError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AccessError::Config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn login(&self, method: &str, username: &str, password: &str) -> Result<String, AccessError> {
        let method = method.to_lowercase();
        let url = self.url(["v1", "auth", method.as_str(), "login", username])?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(|e| AccessError::SecretStore(format!("login request failed: {e}")))?;

        let status = response.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Denied | StatusClass::Forbidden => {
                return Err(AccessError::AuthFailed(format!(
                    "login as {username} rejected with status {status}, \
                     set {UPDATE_CREDENTIALS_ENV_VAR}=1 to re-enter credentials"
                )));
            }
            StatusClass::Other => {
                return Err(AccessError::SecretStore(format!(
                    "login returned status {status}"
                )));
            }
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| AccessError::SecretStore(format!("unreadable login response: {e}")))?;
        body.auth
            .map(|auth| auth.client_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AccessError::AuthFailed("login response carried no token".to_string()))
    }

    async fn read(&self, path: &str, token: &str) -> Result<Value, ReadError> {
        let segments = std::iter::once("v1").chain(path.split('/').filter(|s| !s.is_empty()));
        let url = self.url(segments)?;
        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| AccessError::SecretStore(format!("reading {path} failed: {e}")))?;

        let status = response.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => response.json::<Value>().await.map_err(|e| {
                ReadError::Failed(AccessError::SecretStore(format!(
                    "unreadable secret at {path}: {e}"
                )))
            }),
            StatusClass::Forbidden => Err(ReadError::Forbidden),
            _ if status == 404 => Err(ReadError::Failed(AccessError::SecretStore(format!(
                "no secret at {path}"
            )))),
            _ => Err(ReadError::Failed(AccessError::SecretStore(format!(
                "reading {path} returned status {status}"
            )))),
        }
    }
}

/// A string field of a KV v1 (`data.k`) or KV v2 (`data.data.k`) response.
fn secret_field(body: &Value, key: &str) -> Option<String> {
    let data = body.get("data")?;
    let fields = match data.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => data,
    };
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
