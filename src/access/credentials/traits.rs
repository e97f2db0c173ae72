//! Credential provider trait definitions.

use crate::access::error::AccessError;

/// Source of the secret store's own login credentials.
///
/// Calls may block (keyring access, terminal prompts); async callers wrap
/// them in `spawn_blocking`.
pub trait CredentialProvider: Send + Sync {
    /// A value already known for `label`, if any.
    fn get(&self, label: &str) -> Result<Option<String>, AccessError>;

    /// Ask the operator for `label`.
    fn prompt(&self, label: &str) -> Result<String, AccessError>;

    /// Remember `secret` under `label`.
    fn store(&self, label: &str, secret: &str) -> Result<(), AccessError>;

    /// Known value, otherwise prompt and store the answer.
    fn resolve(&self, label: &str) -> Result<String, AccessError> {
        if let Some(value) = self.get(label)? {
            return Ok(value);
        }
        let value = self.prompt(label)?;
        self.store(label, &value)?;
        Ok(value)
    }

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
