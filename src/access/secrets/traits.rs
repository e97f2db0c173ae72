//! Secret fetcher trait definitions.

use async_trait::async_trait;

use crate::access::error::AccessError;
use crate::access::session::Tunnel;
use crate::access::types::Credentials;

/// Reads database credentials through a ready session.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    /// Fetch the credentials of the database at `endpoint_host`.
    ///
    /// The secret store is reached through the session's `secrets` forward.
    ///
    /// # Errors
    ///
    /// * `AuthFailed` - the store kept rejecting the login or the token
    /// * `IncompleteSecret` - the record lacks username, password or database
    /// * `SecretStore` - any other store or transport failure
    async fn fetch_credentials(
        &self,
        session: &dyn Tunnel,
        endpoint_host: &str,
    ) -> Result<Credentials, AccessError>;
}
