use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use shelter_ledger::app::{App, RunOptions};
use shelter_ledger::ckan::CkanHttpClient;
use shelter_ledger::config::ConfigLoader;
use shelter_ledger::domain::UnparsedDatePolicy;
use shelter_ledger::error::LedgerError;
use shelter_ledger::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "shelter-ledger")]
#[command(about = "Append new Toronto shelter occupancy records to a deduplicated CSV ledger")]
#[command(version, author)]
struct Cli {
    /// Config file (default: ./shelter-ledger.json when present)
    #[arg(long)]
    config: Option<String>,

    /// CKAN package to ingest
    #[arg(long)]
    package: Option<String>,

    /// CKAN portal root
    #[arg(long)]
    base_url: Option<String>,

    /// Ledger CSV path
    #[arg(long)]
    ledger: Option<String>,

    /// What to do with rows whose occupancy date is not a recognized date
    #[arg(long, value_enum)]
    unparsed_dates: Option<UnparsedDatePolicy>,

    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LedgerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LedgerError) -> u8 {
    match error {
        LedgerError::InvalidPackageId(_)
        | LedgerError::InvalidResourceId(_)
        | LedgerError::InvalidBaseUrl(_)
        | LedgerError::InvalidConfig(_)
        | LedgerError::ConfigRead(_)
        | LedgerError::ConfigParse(_)
        | LedgerError::MissingColumn(_)
        | LedgerError::ShortRow { .. } => 2,
        LedgerError::CkanHttp(_) | LedgerError::CkanStatus { .. } | LedgerError::CkanApi(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::load(cli.config.as_deref())?;
    if cli.package.is_some() {
        config.package_id = cli.package;
    }
    if cli.base_url.is_some() {
        config.base_url = cli.base_url;
    }
    if cli.ledger.is_some() {
        config.ledger_path = cli.ledger;
    }
    if cli.unparsed_dates.is_some() {
        config.unparsed_dates = cli.unparsed_dates;
    }
    let resolved = ConfigLoader::resolve_config(config)?;

    let client = CkanHttpClient::new(
        resolved.base_url.clone(),
        resolved.timeout,
        resolved.max_retries,
    )?;
    let app = App::new(client, resolved);
    let options = RunOptions {
        dry_run: cli.dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = app.run(options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let summary = app.run(options, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
