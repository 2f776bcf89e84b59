//! gatehouse CLI binary entry point.

use clap::Parser;
use gatehouse::cli::{Cli, Commands, SessionCommands, TokenCommands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GATEHOUSE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Token(args) => match args.command {
            TokenCommands::Inspect { token } => gatehouse::cli::session::handle_inspect(config, token),
        },
        Commands::Session(args) => match args.command {
            SessionCommands::Status => gatehouse::cli::session::handle_status(config),
            SessionCommands::Login { token } => gatehouse::cli::session::handle_login(config, &token),
            SessionCommands::Logout => gatehouse::cli::session::handle_logout(config),
        },
        Commands::Request(args) => {
            gatehouse::cli::session::handle_request(config, &args.method, &args.path, args.data.as_deref())
                .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
