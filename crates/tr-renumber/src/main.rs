use std::ffi::OsString;

use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use tr_common::db::{
    ConcurrencyMode, PgDayProcessor, PgPool, ProcessorOptions, RENUMBER_POOL_SIZE,
    TableNameError, TicketStorageError, TicketTables, create_pool_from_url,
};
use tr_common::race_date::{DEFAULT_END_KEY, DEFAULT_START_KEY};
use tr_common::{RaceDate, RaceDates, RunSummary, logging, run_id, run_race_dates};
use tracing::info;

const APP_NAME: &str = "tr-renumber";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Concurrency {
    /// No other writers touch tickets during the pass
    Exclusive,
    /// Lock tickets against other writers while each date is processed
    TableLock,
}

impl From<Concurrency> for ConcurrencyMode {
    fn from(value: Concurrency) -> Self {
        match value {
            Concurrency::Exclusive => ConcurrencyMode::Exclusive,
            Concurrency::TableLock => ConcurrencyMode::TableLock,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tr-renumber",
    about = "Assign dense new_id values to tickets, one race date at a time"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// First race date to process (YYYYMMDD, inclusive)
    #[arg(long, env = "TR_START_DATE", default_value = DEFAULT_START_KEY)]
    start_date: RaceDate,

    /// Last race date to process (YYYYMMDD, inclusive)
    #[arg(long, env = "TR_END_DATE", default_value = DEFAULT_END_KEY)]
    end_date: RaceDate,

    /// Schema holding tickets and raw_ticket_batches
    #[arg(long, env = "TR_SCHEMA", default_value = "public")]
    schema: String,

    /// Assumption about other writers to tickets during the pass
    #[arg(long, env = "TR_CONCURRENCY", default_value = "exclusive", value_enum)]
    concurrency: Concurrency,

    /// Compute assignments without writing them
    #[arg(long, env = "TR_DRY_RUN", default_value_t = false)]
    dry_run: bool,

    /// Print the run summary as JSON on stdout when the pass finishes
    #[arg(long, default_value_t = false)]
    summary_json: bool,
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error(transparent)]
    Cli(#[from] clap::Error),
    #[error("invalid schema: {0}")]
    Schema(#[from] TableNameError),
}

#[derive(Debug, Clone)]
struct RenumberConfig {
    database_url: String,
    dates: RaceDates,
    tables: TicketTables,
    concurrency: ConcurrencyMode,
    dry_run: bool,
    summary_json: bool,
}

impl RenumberConfig {
    fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        Ok(Self {
            dates: RaceDates::new(cli.start_date, cli.end_date),
            tables: TicketTables::in_schema(&cli.schema)?,
            concurrency: cli.concurrency.into(),
            dry_run: cli.dry_run,
            summary_json: cli.summary_json,
            database_url: cli.database_url,
        })
    }

    /// Parse `args` and validate the result. Bad date keys surface here as
    /// `ConfigError::Cli` rather than exiting from inside clap.
    fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::from_cli(Cli::try_parse_from(args)?)
    }

    fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            tables: self.tables.clone(),
            concurrency: self.concurrency,
            dry_run: self.dry_run,
        }
    }
}

/// Run the pass on one pooled connection. The processor owns that
/// connection and returns it to the pool when it goes out of scope, on
/// success and on error alike.
async fn renumber(
    pool: &PgPool,
    config: &RenumberConfig,
) -> Result<RunSummary, TicketStorageError> {
    let mut processor = PgDayProcessor::acquire(pool, config.processor_options()).await?;
    run_race_dates(&mut processor, config.dates).await
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_tracing_subscriber(APP_NAME);
    logging::install_tracing_panic_hook(APP_NAME);

    let config = match RenumberConfig::from_args(std::env::args_os()) {
        // --help and --version
        Err(ConfigError::Cli(err)) if !err.use_stderr() => err.exit(),
        other => other?,
    };
    let pool = create_pool_from_url(&config.database_url, RENUMBER_POOL_SIZE)?;

    info!(
        run_id = run_id::get(),
        start = %config.dates.start(),
        end = %config.dates.end(),
        dates = config.dates.len(),
        schema = config.tables.schema(),
        concurrency = config.concurrency.as_str(),
        dry_run = config.dry_run,
        "starting renumbering pass"
    );

    let result = renumber(&pool, &config).await;
    pool.close();
    let summary = result?;

    if config.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "{APP_NAME} failed");
        eprintln!("{APP_NAME} failed: {err}");
        std::process::exit(1);
    }
}
