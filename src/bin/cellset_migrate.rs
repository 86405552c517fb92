use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cellset_migrations::app::App;
use cellset_migrations::config::{Config, ConfigLoader, Environment, ResolvedConfig};
use cellset_migrations::domain::ExperimentId;
use cellset_migrations::error::MigrationError;
use cellset_migrations::output::{JsonOutput, LogProgress};

#[derive(Parser)]
#[command(name = "cellset-migrate")]
#[command(about = "Repair cell-set metadata and migrate document-store dumps to SQL")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    environment: Option<Environment>,

    #[arg(long, global = true)]
    max_in_flight: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Rebuild metadata groups of cell-set documents")]
    RepairCellSets(RepairArgs),
    #[command(about = "Write the document-store dumps as an SQL insert script")]
    MigrateSql,
    #[command(about = "Print the relational schema")]
    Schema(SchemaArgs),
}

#[derive(Args)]
struct RepairArgs {
    /// Only repair these experiments instead of listing the bucket.
    #[arg(long = "experiment")]
    experiments: Vec<ExperimentId>,
}

#[derive(Args)]
struct SchemaArgs {
    #[command(subcommand)]
    direction: SchemaDirection,

    #[arg(long, global = true)]
    raw: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum SchemaDirection {
    Up,
    Down,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<MigrationError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &MigrationError) -> u8 {
    match error {
        MigrationError::MissingConfig
        | MigrationError::ConfigRead(_)
        | MigrationError::ConfigParse(_)
        | MigrationError::InvalidConfig(_) => 2,
        MigrationError::StorageHttp(_)
        | MigrationError::StorageStatus { .. }
        | MigrationError::DumpRead { .. }
        | MigrationError::SqlWrite { .. }
        | MigrationError::Filesystem(_) => 3,
        _ => 1,
    }
}

/// Returns `false` when a batch finished with failed items.
fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::new(load_config(&cli)?);

    match cli.command {
        Commands::RepairCellSets(args) => {
            let report = app.repair_cell_sets(&args.experiments, &LogProgress)?;
            JsonOutput::print_repair(&report).into_diagnostic()?;
            Ok(!report.has_failures())
        }
        Commands::MigrateSql => {
            let report = app.migrate_sql(&LogProgress)?;
            JsonOutput::print_migration(&report).into_diagnostic()?;
            Ok(!report.has_failures())
        }
        Commands::Schema(args) => {
            let result = app.schema(matches!(args.direction, SchemaDirection::Down));
            if args.raw {
                print!("{}", result.sql);
            } else {
                JsonOutput::print_schema(&result).into_diagnostic()?;
            }
            Ok(true)
        }
    }
}

/// Without an explicit `--config`, a missing default file falls back to built-in defaults.
fn load_config(cli: &Cli) -> Result<ResolvedConfig, MigrationError> {
    let mut config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(MigrationError::MissingConfig) => {
            tracing::debug!("no config file, using defaults");
            Config::default()
        }
        Err(err) => return Err(err),
    };
    if let Some(environment) = cli.environment {
        config.environment = Some(environment);
    }
    if let Some(max_in_flight) = cli.max_in_flight {
        config.max_in_flight = Some(max_in_flight);
    }
    ConfigLoader::resolve_config(config)
}
