#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use clap::Parser;
use dotenv::dotenv;
use jumpdb::cli::{self, Cli};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr; the database client owns stdout
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level.parse().expect("valid directive")),
        )
        .init();

    // Ctrl-C cancels the pre-launch phases; a running client handles it itself
    let interrupt = CancellationToken::new();
    let on_interrupt = interrupt.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received");
            on_interrupt.cancel();
        }
    });

    let code = cli::run(cli, interrupt).await;
    std::process::exit(code)
}
