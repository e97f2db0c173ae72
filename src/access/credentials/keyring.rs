//! OS keyring backed credential provider.
//!
//! Lookup order for a label such as `Vault Okta Password`:
//!
//! 1. Environment variable `VAULT_OKTA_PASSWORD`
//! 2. Keyring entry (service `jumpdb`, account = label)
//! 3. Interactive prompt, masked for passwords; the answer goes to the keyring
//!
//! With `force_prompt` set the first two steps are skipped by
//! [`CredentialProvider::resolve`], which lets the operator replace stale
//! credentials.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use ::keyring::Entry;
use tracing::debug;

use super::traits::CredentialProvider;
use crate::access::error::AccessError;

pub const KEYRING_SERVICE: &str = "jumpdb";

pub struct KeyringProvider {
    service: String,
    force_prompt: bool,
}

impl KeyringProvider {
    pub fn new(force_prompt: bool) -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            force_prompt,
        }
    }

    fn entry(&self, label: &str) -> Result<Entry, AccessError> {
        Entry::new(&self.service, label)
            .map_err(|e| AccessError::CredentialStore(format!("{label}: {e}")))
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new(false)
    }
}

/// `"Vault Okta Username"` -> `"VAULT_OKTA_USERNAME"`
pub fn env_var_name(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn is_secret(label: &str) -> bool {
    label.to_ascii_lowercase().ends_with("password")
}

impl CredentialProvider for KeyringProvider {
    fn get(&self, label: &str) -> Result<Option<String>, AccessError> {
        if let Ok(value) = std::env::var(env_var_name(label))
            && !value.is_empty()
        {
            debug!("{} taken from the environment", label);
            return Ok(Some(value));
        }

        match self.entry(label)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AccessError::CredentialStore(format!("{label}: {e}"))),
        }
    }

    fn prompt(&self, label: &str) -> Result<String, AccessError> {
        let theme = ColorfulTheme::default();
        let prompt = format!("Enter {label}");
        let answer = if is_secret(label) {
            Password::with_theme(&theme).with_prompt(prompt).interact()
        } else {
            Input::<String>::with_theme(&theme)
                .with_prompt(prompt)
                .interact_text()
        };
        answer.map_err(|e| AccessError::CredentialStore(format!("prompt for {label}: {e}")))
    }

    fn store(&self, label: &str, secret: &str) -> Result<(), AccessError> {
        self.entry(label)?
            .set_password(secret)
            .map_err(|e| AccessError::CredentialStore(format!("{label}: {e}")))?;
        debug!("{} stored in the keyring", label);
        Ok(())
    }

    fn resolve(&self, label: &str) -> Result<String, AccessError> {
        if !self.force_prompt
            && let Some(value) = self.get(label)?
        {
            return Ok(value);
        }
        let value = self.prompt(label)?;
        self.store(label, &value)?;
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "KeyringProvider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::config::tests::ENV_TEST_MUTEX;

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("Vault Okta Username"), "VAULT_OKTA_USERNAME");
        assert_eq!(env_var_name("Vault/Okta Password"), "VAULT_OKTA_PASSWORD");
    }

    #[test]
    fn test_password_labels_are_masked() {
        assert!(is_secret("Vault Okta Password"));
        assert!(!is_secret("Vault Okta Username"));
    }

    #[test]
    fn test_environment_wins() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let label = "Jumpdb Test Username";
        // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
        unsafe { std::env::set_var(env_var_name(label), "alice") };
        let value = KeyringProvider::default().get(label);
        // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
        unsafe { std::env::remove_var(env_var_name(label)) };
        assert_eq!(value.unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(KeyringProvider::new(true).name(), "KeyringProvider");
    }
}
