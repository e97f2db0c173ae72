//! On-disk cache of the secret store token.
//!
//! One file per secret store logical name, `token-<name>` with dots replaced
//! by dashes, holding the raw token and a trailing newline. Writes go through
//! a temporary file in the same directory that is renamed into place, so a
//! reader never sees a partial token. The file mode is always 0600.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::access::error::AccessError;

#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(dir: &Path, logical_name: &str) -> Self {
        Self {
            path: dir.join(file_name(logical_name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached token, or `None` when there is no usable file.
    pub fn load(&self) -> Result<Option<String>, AccessError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let token = text.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AccessError::io(
                format!("reading {}", self.path.display()),
                e,
            )),
        }
    }

    pub fn store(&self, token: &str) -> Result<(), AccessError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| AccessError::Config(format!("{} has no parent", self.path.display())))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| AccessError::io(format!("creating {}", dir.display()), e))?;

        let mut file = NamedTempFile::new_in(dir)
            .map_err(|e| AccessError::io(format!("creating a file in {}", dir.display()), e))?;
        restrict_permissions(file.path())?;
        writeln!(file, "{token}")
            .and_then(|_| file.flush())
            .map_err(|e| AccessError::io("writing the token", e))?;
        file.persist(&self.path)
            .map_err(|e| AccessError::io(format!("replacing {}", self.path.display()), e.error))?;

        debug!("Token cached at {}", self.path.display());
        Ok(())
    }

    /// Remove the file; a missing file is fine.
    pub fn clear(&self) -> Result<(), AccessError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AccessError::io(
                format!("removing {}", self.path.display()),
                e,
            )),
        }
    }
}

fn file_name(logical_name: &str) -> String {
    format!("token-{}", logical_name.replace('.', "-"))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), AccessError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| AccessError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), AccessError> {
    Ok(())
}
