//! Command line surface.
//!
//! ```text
//! jumpdb db [FILTER] [--host H --engine E] [-- CMD ARGS...]
//! jumpdb config
//! jumpdb credentials
//! ```
//!
//! Every subcommand reports failures as a single line on stderr and maps
//! them to an exit code through [`ConnectError::exit_code`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::access::config::{
    self, Config, resolve_ssh_program, resolve_update_credentials,
};
use crate::access::credentials::{CredentialProvider, KeyringProvider};
use crate::access::launcher::InteractiveClientLauncher;
use crate::access::lookup::{self, CatalogLookup, InstanceLookup};
use crate::access::secrets::VaultFetcher;
use crate::access::session::{DEFAULT_TERMINATION_GRACE, SessionOptions, SshTunnelFactory};
use crate::access::ssh_config::SshConfig;
use crate::access::{AccessError, ConnectError, Coordinator, Phase, TargetDescriptor};

#[derive(Parser, Debug)]
#[command(
    name = "jumpdb",
    about = "Open database shells on private instances through an SSH bastion",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding config.yml, shared.yml and the token cache
    #[arg(long, global = true, env = "JUMPDB_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect a database client to an instance through its bastion
    Db(DbArgs),

    /// Print the effective configuration
    Config,

    /// Enter and store the secret store username and password
    Credentials,
}

#[derive(Args, Debug)]
pub struct DbArgs {
    /// Part of the instance endpoint to look up in the catalog
    pub filter: Option<String>,

    /// Endpoint host, bypassing the catalog
    #[arg(long, requires = "engine")]
    pub host: Option<String>,

    /// Engine of --host (mysql or postgres)
    #[arg(long, requires = "host")]
    pub engine: Option<String>,

    /// ssh binary for the bastion session
    #[arg(long)]
    pub ssh_program: Option<PathBuf>,

    /// Seconds allowed for the forwards to become ready
    #[arg(long)]
    pub start_deadline: Option<u64>,

    /// Seconds allowed for ssh to reach the bastion
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Prompt again for the secret store credentials
    #[arg(long)]
    pub update_credentials: bool,

    /// Command to run instead of the default client
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Run the parsed command line and return the process exit code.
pub async fn run(cli: Cli, interrupt: CancellationToken) -> i32 {
    let config_dir = cli.config_dir;
    let result = match cli.command {
        Commands::Db(args) => db(config_dir, args, interrupt).await,
        Commands::Config => print_config(config_dir),
        Commands::Credentials => store_credentials(config_dir).await,
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("jumpdb: {e}");
            e.exit_code()
        }
    }
}

fn resolve(error: AccessError) -> ConnectError {
    ConnectError::new(Phase::Resolve, error)
}

fn load(config_dir: Option<PathBuf>) -> Result<(PathBuf, Config), AccessError> {
    let dir = match config_dir {
        Some(dir) => dir,
        None => config::config_dir()?,
    };
    debug!("Loading configuration from {}", dir.display());
    let config = Config::load(&dir)?;
    Ok((dir, config))
}

async fn db(
    config_dir: Option<PathBuf>,
    args: DbArgs,
    interrupt: CancellationToken,
) -> Result<(), ConnectError> {
    let (dir, config) = load(config_dir).map_err(resolve)?;
    let config = Arc::new(config);

    let target: TargetDescriptor = match (&args.host, &args.engine) {
        (Some(host), Some(engine)) => lookup::describe(&config, host, engine).map_err(resolve)?,
        _ => CatalogLookup::new(Arc::clone(&config))
            .resolve(args.filter.as_deref().unwrap_or_default())
            .await
            .map_err(resolve)?,
    };

    let ssh_config = match SshConfig::default_path() {
        Some(path) => SshConfig::load(&path).map_err(resolve)?,
        None => SshConfig::default(),
    };
    let options = SessionOptions {
        ssh_program: resolve_ssh_program(args.ssh_program),
        start_deadline: config.resolve_start_deadline(args.start_deadline),
        connect_timeout: config.resolve_connect_timeout(args.connect_timeout),
        termination_grace: DEFAULT_TERMINATION_GRACE,
    };

    let provider = Arc::new(KeyringProvider::new(resolve_update_credentials(
        args.update_credentials,
    )));
    let fetcher = VaultFetcher::new(config.secret_store.clone(), dir, provider);

    let coordinator = Coordinator::new(
        Arc::clone(&config),
        Arc::new(SshTunnelFactory::new(ssh_config, options)),
        Arc::new(fetcher),
        Arc::new(InteractiveClientLauncher::new()),
    )
    .with_interrupt(interrupt);

    coordinator.connect(&target, &args.command).await
}

fn print_config(config_dir: Option<PathBuf>) -> Result<(), ConnectError> {
    print!("{}", render_config(config_dir)?);
    Ok(())
}

fn render_config(config_dir: Option<PathBuf>) -> Result<String, ConnectError> {
    let (_, config) = load(config_dir).map_err(resolve)?;
    config.redacted().to_yaml().map_err(resolve)
}

async fn store_credentials(config_dir: Option<PathBuf>) -> Result<(), ConnectError> {
    let (dir, config) = load(config_dir).map_err(resolve)?;
    let provider = Arc::new(KeyringProvider::new(true));
    let (user_label, password_label) =
        VaultFetcher::new(config.secret_store, dir, provider.clone()).login_labels();

    tokio::task::spawn_blocking(move || -> Result<(), AccessError> {
        provider.resolve(&user_label)?;
        provider.resolve(&password_label)?;
        Ok(())
    })
    .await
    .map_err(|e| AccessError::CredentialStore(e.to_string()))
    .and_then(|stored| stored)
    .map_err(|e| ConnectError::new(Phase::Credentials, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("jumpdb").chain(args.iter().copied()))
    }

    #[test]
    fn test_db_with_filter_and_command() {
        let cli = parse(&["db", "staging-acc", "--", "psql", "-c", "select 1"]).unwrap();
        match cli.command {
            Commands::Db(args) => {
                assert_eq!(args.filter.as_deref(), Some("staging-acc"));
                assert_eq!(args.command, vec!["psql", "-c", "select 1"]);
                assert!(!args.update_credentials);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_host_requires_engine() {
        assert!(parse(&["db", "--host", "staging-accounts.db.example.com"]).is_err());
        let cli = parse(&[
            "db",
            "--host",
            "staging-accounts.db.example.com",
            "--engine",
            "postgres",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Db(DbArgs { host: Some(_), .. })));
    }

    #[test]
    fn test_global_verbose_flag() {
        let cli = parse(&["config", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_config_prints_merged_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(config::USER_CONFIG_FILE),
            "bastionHosts: [{host: jump.example.com}]\n",
        )
        .unwrap();
        assert!(print_config(Some(dir.path().to_path_buf())).is_ok());
    }

    #[test]
    fn test_config_output_masks_pinned_passwords() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(config::USER_CONFIG_FILE),
            "databases: [{prefixMatch: staging-accounts, user: rw, password: p@ss}]\n",
        )
        .unwrap();
        let text = render_config(Some(dir.path().to_path_buf())).unwrap();
        assert!(!text.contains("p@ss"));
        assert!(text.contains("<redacted>"));
        assert!(text.contains("rw"));
    }

    #[test]
    fn test_invalid_config_is_resolve_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(config::USER_CONFIG_FILE),
            "portRange: {min: 5, max: 1}\n",
        )
        .unwrap();
        let error = print_config(Some(dir.path().to_path_buf())).unwrap_err();
        assert_eq!(error.phase, Phase::Resolve);
        assert_eq!(error.exit_code(), 125);
    }
}
