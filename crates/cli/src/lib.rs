pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pestline_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "pestline",
    about = "Pestline operator CLI",
    long_about = "Operate the Pestline sales pipeline: migrations, demo data, quote expiration sweeps, and pipeline reports.",
    after_help = "Examples:\n  pestline migrate\n  pestline seed\n  pestline report pipeline --org <uuid>\n  pestline expire-quotes --org <uuid>"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load a deterministic demo organization with contacts, deals, and quotes")]
    Seed,
    #[command(about = "Expire overdue draft/sent/viewed quotes for an organization")]
    ExpireQuotes {
        #[arg(long, help = "Organization id to sweep")]
        org: Uuid,
    },
    #[command(about = "Render read-side views over an organization's pipeline")]
    Report {
        #[command(subcommand)]
        view: commands::report::ReportView,
    },
    #[command(about = "Validate configuration and database connectivity")]
    Doctor,
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&config).await,
        Command::Seed => commands::seed::run(&config).await,
        Command::ExpireQuotes { org } => commands::expire::run(&config, org).await,
        Command::Report { view } => commands::report::run(&config, view).await,
        Command::Doctor => commands::doctor::run(&config).await,
    };

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
