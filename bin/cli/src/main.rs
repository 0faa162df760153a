use clap::Parser;
use flowpatch_cli::config::CliConfig;
use flowpatch_cli::error::CliError;
use flowpatch_cli::{Args, run};
use rootcause::prelude::Report;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            let report: Report<CliError> = CliError::Config {
                details: err.to_string(),
            }
            .into();
            eprintln!("{report:?}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to stderr so stdout carries only the result.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&args, &config, &mut std::io::stdout().lock()) {
        Ok(outcome) if outcome.result.success => ExitCode::SUCCESS,
        Ok(outcome) => {
            tracing::warn!(
                failed = outcome.result.failed.len(),
                persisted = outcome.persisted,
                "{}",
                outcome.result.message
            );
            ExitCode::from(2)
        }
        Err(report) => {
            tracing::error!(error = %report, "flowpatch failed");
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}
