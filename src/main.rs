//! Fixloop CLI entry point.

use clap::Parser;

use fixloop::cli::commands::{rollback, run, status};
use fixloop::cli::{handle_error, wiring, Cli, Commands};
use fixloop::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match wiring::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &config, cli.json).await,
        Commands::Status(args) => status::execute(args, &config, cli.json).await,
        Commands::Rollback(args) => rollback::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
