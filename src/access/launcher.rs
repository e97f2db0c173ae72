//! Interactive database client handoff.
//!
//! The launcher picks a client, builds a clean environment carrying the
//! credentials, and runs the client attached to the terminal until it exits.
//!
//! # Client selection
//!
//! | User arguments | Program | Extra arguments |
//! |----------------|---------|-----------------|
//! | none (or a lone `--`) | primary client, else fallback client | mysql: `-u<user> <database>` |
//! | `[--] CMD ARGS...` | `CMD` | none |
//!
//! # Environment
//!
//! The child environment is cleared, then given `PATH`, `TERM`, `EDITOR`,
//! `HOME`, `LC_ALL` and `LANG` from the parent (locale defaults to
//! `en_US.UTF-8`) and the credential variables below:
//!
//! | Variables | Value |
//! |-----------|-------|
//! | `PGHOST`, `DB_HOST`, `MYSQL_HOST` | `127.0.0.1` |
//! | `PGPORT`, `DB_PORT`, `MYSQL_TCP_PORT` | local target port |
//! | `PGDATABASE`, `DB_NAME`, `MYSQL_DATABASE` | database |
//! | `PGUSER`, `DB_USER`, `MYSQL_USER` | username |
//! | `PGPASSWORD`, `DB_PASS`, `DB_PASSWORD`, `MYSQL_PWD` | password |

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::engine::{Engine, EngineProfile};
use super::error::AccessError;
use super::types::{Credentials, LOOPBACK};

const DEFAULT_LOCALE: &str = "en_US.UTF-8";

/// Parent variables copied into the client environment as-is.
const INHERITED_VARS: [&str; 4] = ["PATH", "TERM", "EDITOR", "HOME"];

/// Runs the interactive client for a ready target.
#[async_trait]
pub trait ClientRunner: Send + Sync {
    /// Run the client until it exits and return its exit status.
    ///
    /// A signal-terminated client reports `128 + signal`.
    async fn run(
        &self,
        engine: Engine,
        credentials: &Credentials,
        local_port: u16,
        user_args: &[String],
    ) -> Result<i32, AccessError>;
}

/// Program and arguments the launcher will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Decide what to run.
///
/// `find` resolves a client name to a path, returning `None` when the
/// client is not installed.
pub fn build_command(
    profile: &EngineProfile,
    credentials: &Credentials,
    user_args: &[String],
    find: impl Fn(&str) -> Option<PathBuf>,
) -> Result<ClientCommand, AccessError> {
    let user_args = match user_args.first() {
        Some(first) if first == "--" => &user_args[1..],
        _ => user_args,
    };

    if let Some((program, rest)) = user_args.split_first() {
        return Ok(ClientCommand {
            program: PathBuf::from(program),
            args: rest.to_vec(),
        });
    }

    let program = find(profile.primary_client)
        .or_else(|| find(profile.fallback_client))
        .ok_or(AccessError::ClientNotAvailable {
            primary: profile.primary_client,
            fallback: profile.fallback_client,
        })?;

    let mut args = Vec::new();
    if profile.engine.needs_positional_args() {
        args.push(format!("-u{}", credentials.username));
        args.push(credentials.database.clone());
    }
    Ok(ClientCommand { program, args })
}

/// Environment of the client process.
///
/// `parent` reads a variable from the launching process.
pub fn client_environment(
    credentials: &Credentials,
    local_port: u16,
    parent: impl Fn(&str) -> Option<String>,
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = INHERITED_VARS
        .iter()
        .filter_map(|name| parent(name).map(|value| (name.to_string(), value)))
        .collect();
    for name in ["LC_ALL", "LANG"] {
        let value = parent(name)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        env.push((name.to_string(), value));
    }

    let port = local_port.to_string();
    let table: [(&str, &str); 16] = [
        ("PGHOST", LOOPBACK),
        ("PGPORT", port.as_str()),
        ("PGDATABASE", credentials.database.as_str()),
        ("PGUSER", credentials.username.as_str()),
        ("PGPASSWORD", credentials.password.as_str()),
        ("DB_HOST", LOOPBACK),
        ("DB_PORT", port.as_str()),
        ("DB_NAME", credentials.database.as_str()),
        ("DB_USER", credentials.username.as_str()),
        ("DB_PASS", credentials.password.as_str()),
        ("DB_PASSWORD", credentials.password.as_str()),
        ("MYSQL_HOST", LOOPBACK),
        ("MYSQL_TCP_PORT", port.as_str()),
        ("MYSQL_DATABASE", credentials.database.as_str()),
        ("MYSQL_USER", credentials.username.as_str()),
        ("MYSQL_PWD", credentials.password.as_str()),
    ];
    env.extend(
        table
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );
    env
}

/// Exit status as a shell would report it.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Launches the real client binaries found on PATH.
#[derive(Debug, Clone, Default)]
pub struct InteractiveClientLauncher {
    search_path: Option<OsString>,
}

impl InteractiveClientLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look clients up in `search_path` instead of the process PATH.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(name, Some(paths), cwd)
            }
            None => which::which(name),
        };
        match found {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("{} not found: {}", name, e);
                None
            }
        }
    }
}

#[async_trait]
impl ClientRunner for InteractiveClientLauncher {
    async fn run(
        &self,
        engine: Engine,
        credentials: &Credentials,
        local_port: u16,
        user_args: &[String],
    ) -> Result<i32, AccessError> {
        let command = build_command(engine.profile(), credentials, user_args, |name| {
            self.find(name)
        })?;
        let env = client_environment(credentials, local_port, |name| std::env::var(name).ok());

        info!(
            "Running: {} {}",
            command.program.display(),
            command.args.join(" ")
        );

        let status = Command::new(&command.program)
            .args(&command.args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| AccessError::io(format!("running {}", command.program.display()), e))?;

        let code = exit_code(status);
        debug!("{} exited with {}", command.program.display(), code);
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn creds() -> Credentials {
        Credentials::new(
            Some("rw".into()),
            Some("p@ss".into()),
            Some("accounts".into()),
            "secret/db/staging-accounts",
        )
        .unwrap()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn installed<'a>(names: &'a [&'a str]) -> impl Fn(&str) -> Option<PathBuf> + 'a {
        move |name| {
            names
                .iter()
                .any(|n| *n == name)
                .then(|| PathBuf::from(format!("/usr/bin/{name}")))
        }
    }

    mod command {
        use super::*;

        #[test]
        fn test_primary_client_preferred() {
            let command = build_command(
                Engine::Postgres.profile(),
                &creds(),
                &[],
                installed(&["pgcli", "psql"]),
            )
            .unwrap();
            assert_eq!(command.program, PathBuf::from("/usr/bin/pgcli"));
            assert!(command.args.is_empty());
        }

        #[test]
        fn test_fallback_client() {
            let command =
                build_command(Engine::Postgres.profile(), &creds(), &[], installed(&["psql"]))
                    .unwrap();
            assert_eq!(command.program, PathBuf::from("/usr/bin/psql"));
        }

        #[test]
        fn test_no_client_installed() {
            let result = build_command(Engine::Mysql.profile(), &creds(), &[], installed(&[]));
            assert!(matches!(
                result,
                Err(AccessError::ClientNotAvailable {
                    primary: "mycli",
                    fallback: "mysql"
                })
            ));
        }

        #[test]
        fn test_mysql_gets_user_and_database() {
            let command =
                build_command(Engine::Mysql.profile(), &creds(), &[], installed(&["mysql"]))
                    .unwrap();
            assert_eq!(command.program, PathBuf::from("/usr/bin/mysql"));
            assert_eq!(command.args, args(&["-urw", "accounts"]));
        }

        #[test]
        fn test_user_command_has_no_extra_args() {
            let command = build_command(
                Engine::Mysql.profile(),
                &creds(),
                &args(&["--", "psql", "-c", "select 1"]),
                installed(&[]),
            )
            .unwrap();
            assert_eq!(command.program, PathBuf::from("psql"));
            assert_eq!(command.args, args(&["-c", "select 1"]));
        }

        #[test]
        fn test_separator_is_optional() {
            let command = build_command(
                Engine::Postgres.profile(),
                &creds(),
                &args(&["mysqldump", "accounts"]),
                installed(&[]),
            )
            .unwrap();
            assert_eq!(command.program, PathBuf::from("mysqldump"));
            assert_eq!(command.args, args(&["accounts"]));
        }

        #[test]
        fn test_lone_separator_means_default_client() {
            let command = build_command(
                Engine::Postgres.profile(),
                &creds(),
                &args(&["--"]),
                installed(&["psql"]),
            )
            .unwrap();
            assert_eq!(command.program, PathBuf::from("/usr/bin/psql"));
        }
    }

    mod environment {
        use super::*;

        fn env_map(parent: &[(&str, &str)]) -> HashMap<String, String> {
            let parent: HashMap<String, String> = parent
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            client_environment(&creds(), 41000, |name| parent.get(name).cloned())
                .into_iter()
                .collect()
        }

        #[test]
        fn test_credentials_round_trip() {
            let env = env_map(&[]);
            let c = creds();
            for name in ["PGUSER", "DB_USER", "MYSQL_USER"] {
                assert_eq!(env[name], c.username);
            }
            for name in ["PGPASSWORD", "DB_PASS", "DB_PASSWORD", "MYSQL_PWD"] {
                assert_eq!(env[name], c.password);
            }
            for name in ["PGDATABASE", "DB_NAME", "MYSQL_DATABASE"] {
                assert_eq!(env[name], c.database);
            }
            for name in ["PGHOST", "DB_HOST", "MYSQL_HOST"] {
                assert_eq!(env[name], "127.0.0.1");
            }
            for name in ["PGPORT", "DB_PORT", "MYSQL_TCP_PORT"] {
                assert_eq!(env[name], "41000");
            }
        }

        #[test]
        fn test_inherits_terminal_settings() {
            let env = env_map(&[
                ("PATH", "/usr/bin"),
                ("TERM", "xterm"),
                ("LANG", "fr_FR.UTF-8"),
                ("AWS_SECRET_ACCESS_KEY", "nope"),
            ]);
            assert_eq!(env["PATH"], "/usr/bin");
            assert_eq!(env["TERM"], "xterm");
            assert_eq!(env["LANG"], "fr_FR.UTF-8");
            assert_eq!(env["LC_ALL"], "en_US.UTF-8");
            assert!(!env.contains_key("EDITOR"));
            assert!(!env.contains_key("AWS_SECRET_ACCESS_KEY"));
        }
    }

    #[cfg(unix)]
    mod running {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[tokio::test]
        async fn test_default_client_sees_credentials() {
            let dir = tempfile::tempdir().unwrap();
            script(dir.path(), "psql", "env > \"${0%/*}/env.out\"");
            let launcher = InteractiveClientLauncher::with_search_path(dir.path());

            let code = launcher
                .run(Engine::Postgres, &creds(), 41000, &[])
                .await
                .unwrap();
            assert_eq!(code, 0);

            let out = std::fs::read_to_string(dir.path().join("env.out")).unwrap();
            assert!(out.lines().any(|l| l == "PGUSER=rw"));
            assert!(out.lines().any(|l| l == "PGPASSWORD=p@ss"));
            assert!(out.lines().any(|l| l == "PGPORT=41000"));
        }

        #[tokio::test]
        async fn test_mysql_positional_arguments_reach_client() {
            let dir = tempfile::tempdir().unwrap();
            script(dir.path(), "mysql", "printf '%s\\n' \"$@\" > \"${0%/*}/args.out\"");
            let launcher = InteractiveClientLauncher::with_search_path(dir.path());

            launcher
                .run(Engine::Mysql, &creds(), 41000, &[])
                .await
                .unwrap();
            let out = std::fs::read_to_string(dir.path().join("args.out")).unwrap();
            assert_eq!(out, "-urw\naccounts\n");
        }

        #[tokio::test]
        async fn test_user_command_status_is_returned() {
            let launcher = InteractiveClientLauncher::new();
            let code = launcher
                .run(
                    Engine::Postgres,
                    &creds(),
                    41000,
                    &args(&["--", "/bin/sh", "-c", "exit 3"]),
                )
                .await
                .unwrap();
            assert_eq!(code, 3);
        }

        #[tokio::test]
        async fn test_signal_exit_maps_to_128_plus_signal() {
            let launcher = InteractiveClientLauncher::new();
            let code = launcher
                .run(
                    Engine::Postgres,
                    &creds(),
                    41000,
                    &args(&["/bin/sh", "-c", "kill -TERM $$"]),
                )
                .await
                .unwrap();
            assert_eq!(code, 128 + 15);
        }

        #[tokio::test]
        async fn test_missing_clients() {
            let dir = tempfile::tempdir().unwrap();
            let launcher = InteractiveClientLauncher::with_search_path(dir.path());
            let result = launcher.run(Engine::Postgres, &creds(), 41000, &[]).await;
            assert!(matches!(result, Err(AccessError::ClientNotAvailable { .. })));
        }
    }
}
