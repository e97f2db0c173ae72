//! Database credentials from the secret store.
//!
//! [`SecretFetcher`] is the seam the coordinator uses; [`VaultFetcher`] talks
//! to Vault through the session's `secrets` forward and keeps its token in a
//! [`TokenCache`].

mod token;
mod traits;
mod vault;

pub use token::TokenCache;
pub use traits::SecretFetcher;
pub use vault::{MAX_REAUTHENTICATIONS, VaultFetcher};
