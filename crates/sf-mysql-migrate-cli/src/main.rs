//! Command-line interface for sf-mysql-migrate.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sf_mysql_migrate::{Config, MigrateError, MysqlTarget, Orchestrator, RestSource, TargetStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sf-mysql-migrate",
    version,
    about = "Migrate a Salesforce object catalog into MySQL"
)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: String,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full migration
    Run {
        /// Print the run summary as JSON on stdout
        #[arg(long)]
        output_json: bool,
    },

    /// Verify source and target connectivity, then exit
    CheckConnections,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli) -> Result<(), MigrateError> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Run { output_json } => {
            let source = Arc::new(RestSource::login(&config.source).await?);
            let target = Arc::new(MysqlTarget::connect(&config.target).await?);

            let result = Orchestrator::new(config, source, target).run().await?;
            if output_json {
                println!("{}", result.to_json()?);
            }
            Ok(())
        }
        Command::CheckConnections => {
            RestSource::login(&config.source).await?;
            let target = MysqlTarget::connect(&config.target).await?;
            target.close().await;
            info!("Source and target connections verified");
            Ok(())
        }
    }
}
