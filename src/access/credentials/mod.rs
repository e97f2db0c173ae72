//! Login credentials for the secret store.
//!
//! The secret store's own username and password come from a
//! [`CredentialProvider`]; [`KeyringProvider`] is the interactive one used by
//! the CLI.

mod keyring;
mod traits;

pub use self::keyring::{KEYRING_SERVICE, KeyringProvider, env_var_name};
pub use self::traits::CredentialProvider;
