mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use relaydesk_core::{SessionContext, SessionController};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a store connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "relaydesk", &mut std::io::stdout());
            Ok(())
        }

        // Everything else signs in first; the store session lives only
        // as long as this process.
        cmd => {
            let conn = config::resolve_connection(&cli.global)?;
            let credentials = conn.credentials.clone().ok_or_else(|| CliError::NoCredentials {
                profile: cli.global.profile.clone().unwrap_or_else(|| "default".into()),
            })?;

            let ctx = SessionContext::connect(&conn)?;
            let session = SessionController::new(ctx)?;
            session
                .login(&credentials.email, &credentials.password)
                .await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &session, &cli.global, conn.timeout).await;
            session.shutdown().await;
            result
        }
    }
}
