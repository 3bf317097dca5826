mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, LogFormat};

mod cmd;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Commands::Consumer(args) => cmd::consumer::run(args).await,
        Commands::DbChanges(args) => cmd::db_changes::run(args).await,
        Commands::Producer(args) => cmd::producer::run(args).await,
        Commands::Auth(args) => cmd::auth::run(args).await,
        Commands::Standalone(args) => cmd::standalone::run(args).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "relay stopped with an error");
        std::process::exit(1);
    }
}
