//! Vitals CLI - Main entry point

use clap::Parser;
use std::process;
use tracing::error;
use vitals_cli::commands::ingest::IngestOptions;
use vitals_cli::{commands, Cli, Commands};
use vitals_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose mode logs debug to the console, otherwise only warnings
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("vitals-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let guard = init_logging(&log_config).ok();

    let code = match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            1
        },
    };

    drop(guard);
    process::exit(code);
}

/// Execute the CLI command, returning the process exit code
async fn execute_command(cli: &Cli) -> anyhow::Result<i32> {
    let database_url = cli.database_url.as_deref();

    match &cli.command {
        Commands::Ingest {
            file,
            batch_size,
            prefetch,
            timeout_secs,
            staging_dir,
        } => {
            let options = IngestOptions {
                batch_size: *batch_size,
                prefetch: *prefetch,
                timeout_secs: *timeout_secs,
                staging_dir: staging_dir.clone(),
                show_progress: cli.verbose,
            };
            let report = commands::ingest::run(file, &options, database_url).await?;
            Ok(report.exit_code())
        },

        Commands::Count => {
            commands::count::run(database_url).await?;
            Ok(0)
        },

        Commands::InitDb => {
            commands::init_db::run(database_url).await?;
            Ok(0)
        },
    }
}
