//! Bastion lookup in the user's SSH client configuration.
//!
//! Only the subset needed to describe a bastion is read: `User`,
//! `IdentityFile`, `Port` and `HostName`. `Host` blocks are evaluated the way
//! OpenSSH does it: patterns support `*` and `?` wildcards and `!` negation,
//! and for each keyword the first value obtained wins. `Match` blocks and
//! `Include` directives are skipped; the ssh child still applies them.

use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;

use super::error::AccessError;
use super::types::BastionSpec;

#[derive(Debug, Clone, Default)]
struct HostBlock {
    patterns: Vec<String>,
    options: Vec<(String, String)>,
}

impl HostBlock {
    fn matches(&self, host: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            let (negated, pattern) = match pattern.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };
            let hit = Pattern::new(pattern)
                .map(|p| p.matches(host))
                .unwrap_or(pattern == host);
            if hit && negated {
                return false;
            }
            matched |= hit && !negated;
        }
        matched
    }
}

/// Parsed `~/.ssh/config`.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

/// Options that apply to one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOptions {
    pub host_name: Option<String>,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub port: Option<u16>,
}

impl SshConfig {
    /// `~/.ssh/config`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ssh").join("config"))
    }

    /// Read a config file; a missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self, AccessError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ssh configuration at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(AccessError::io(format!("reading {}", path.display()), e)),
        }
    }

    pub fn parse(text: &str) -> Self {
        // Options before the first Host line apply to every host.
        let mut blocks = vec![HostBlock {
            patterns: vec!["*".to_string()],
            options: Vec::new(),
        }];
        let mut skipping = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((keyword, value)) = split_directive(line) else {
                continue;
            };
            match keyword.as_str() {
                "host" => {
                    skipping = false;
                    blocks.push(HostBlock {
                        patterns: value.split_whitespace().map(str::to_string).collect(),
                        options: Vec::new(),
                    });
                }
                "match" => skipping = true,
                _ if skipping => {}
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block.options.push((keyword, value));
                    }
                }
            }
        }

        Self { blocks }
    }

    /// Collect the options that apply to `host`, first value wins.
    pub fn lookup(&self, host: &str) -> HostOptions {
        let mut options = HostOptions::default();
        for block in self.blocks.iter().filter(|b| b.matches(host)) {
            for (keyword, value) in &block.options {
                match keyword.as_str() {
                    "hostname" if options.host_name.is_none() => {
                        options.host_name = Some(value.clone());
                    }
                    "user" if options.user.is_none() => options.user = Some(value.clone()),
                    "identityfile" if options.identity_file.is_none() => {
                        options.identity_file = Some(expand_home(value));
                    }
                    "port" if options.port.is_none() => options.port = value.parse().ok(),
                    _ => {}
                }
            }
        }
        options
    }

    /// Describe the bastion `host`; fails when no block gives it a `User`.
    pub fn bastion_spec(&self, host: &str) -> Result<BastionSpec, AccessError> {
        if host.trim().is_empty() {
            return Err(AccessError::Config("bastion host is empty".to_string()));
        }
        let options = self.lookup(host);
        let user = options.user.filter(|u| !u.is_empty()).ok_or_else(|| {
            AccessError::Config(format!(
                "no User configured for bastion {host} in the ssh configuration"
            ))
        })?;
        if let Some(host_name) = &options.host_name {
            debug!("Bastion {} connects to {}", host, host_name);
        }
        Ok(BastionSpec {
            host: host.to_string(),
            user,
            identity_file: options.identity_file,
            port: options.port,
        })
    }
}

/// Split `Keyword value`, `Keyword=value` or `Keyword = "value"`.
fn split_directive(line: &str) -> Option<(String, String)> {
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = line[..split_at].to_ascii_lowercase();
    let rest = line[split_at..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    let value = rest
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(rest);
    if value.is_empty() {
        return None;
    }
    Some((keyword, value.to_string()))
}

fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}
