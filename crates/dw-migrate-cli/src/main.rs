//! dw-migrate CLI - warehouse table migration tooling.

use clap::{Parser, Subcommand, ValueEnum};
use dw_migrate::orchestrator::{plan_table, probe_destination, HealthCheckResult, TablePlan};
use dw_migrate::typemap::{map_column, mapper_for};
use dw_migrate::{
    ColumnDescriptor, Config, DestinationKind, MigrateError, MigrationResult, Migrator,
    MysqlDestination, SchemaFileSource,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dw-migrate")]
#[command(about = "Warehouse table migration: schema mapping, type coercion and batched loading")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error [default: run.log_level from the config]
    #[arg(long)]
    verbosity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration, and the mapping plan when a schema is given
    Validate {
        /// Source schema file (YAML or JSON list of columns)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Show the destination table a run would create
    Plan {
        /// Source schema file (YAML or JSON list of columns)
        #[arg(long)]
        schema: PathBuf,
    },

    /// Map source column types to a destination type system
    MapType {
        /// Destination type system
        #[arg(long, value_enum, default_value = "bigquery")]
        target: Target,

        /// Source types, e.g. bigint 'decimal(10,2)' 'array<string>'
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// Test the destination connection
    HealthCheck,

    /// Run the migration state machine against a schema file
    Migrate {
        /// Source schema file (YAML or JSON list of columns)
        #[arg(long)]
        schema: PathBuf,

        /// Plan and check the destination without reading or writing data
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Bigquery,
    Mysql,
}

impl From<Target> for DestinationKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Bigquery => DestinationKind::Analytical,
            Target::Mysql => DestinationKind::Relational,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Type lookups need no configuration file
    if let Commands::MapType { target, types } = &cli.command {
        setup_logging(cli.verbosity.as_deref().unwrap_or("warn"), &cli.log_format);
        return map_types((*target).into(), types, cli.output_json);
    }

    let config = Config::load(&cli.config)?;
    setup_logging(
        cli.verbosity.as_deref().unwrap_or(&config.run.log_level),
        &cli.log_format,
    );
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::MapType { .. } => unreachable!(), // Handled above

        Commands::Validate { schema } => {
            if let Some(path) = schema {
                let columns = load_schema(&path)?;
                let plan = plan_for(&config, &columns)?;
                info!(
                    "Mapping plan for {} is valid ({} destination columns)",
                    plan.source_table,
                    plan.columns.len()
                );
            }
            println!("Configuration is valid");
        }

        Commands::Plan { schema } => {
            let columns = load_schema(&schema)?;
            let plan = plan_for(&config, &columns)?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan.columns)?);
            } else {
                print_plan(&config, &plan);
            }
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                if let Some(dest) = &result.destination {
                    println!(
                        "  Destination ({}): {} ({}ms)",
                        dest.name,
                        if dest.connected { "OK" } else { "FAILED" },
                        dest.latency_ms
                    );
                    if let Some(ref err) = dest.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    config.destination_scope(),
                    "health check failed",
                ));
            }
        }

        Commands::Migrate { schema, dry_run } => {
            // The binary ships no warehouse client, so rows can never be read
            if !dry_run && !config.run.dry_run {
                return Err(MigrateError::Unsupported(
                    "migrate needs a warehouse client to read source rows; \
                     pass --dry-run, or use the library API with a WarehouseSession"
                        .to_string(),
                ));
            }
            let source = SchemaFileSource::load(&schema)?;
            let plan = plan_for(&config, source.columns())?;
            let result = dry_run_migration(config.clone(), source).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_plan(&config, &plan);
                println!(
                    "Dry run {} finished in {:.1}s; nothing was written",
                    result.run_id, result.duration_seconds
                );
            }
        }
    }

    Ok(())
}

fn load_schema(path: &Path) -> Result<Vec<ColumnDescriptor>, MigrateError> {
    Ok(SchemaFileSource::load(path)?.into_columns())
}

fn plan_for(config: &Config, columns: &[ColumnDescriptor]) -> Result<TablePlan, MigrateError> {
    let mapper = mapper_for(config.destination.r#type);
    plan_table(
        config,
        &config.source.table,
        config.destination_table(),
        columns,
        mapper.as_ref(),
    )
}

fn print_plan(config: &Config, plan: &TablePlan) {
    println!(
        "Plan: {} -> {}.{} ({})",
        plan.source_table,
        config.destination_scope(),
        plan.destination_table,
        config.destination.r#type
    );
    let width = plan.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for col in &plan.columns {
        println!(
            "  {:<width$}  {}{}",
            col.name,
            col.data_type,
            if col.nullable { "" } else { " NOT NULL" },
            width = width
        );
    }
    if plan.transformer.is_some() {
        println!("  (mapping plan applied)");
    }
}

fn map_types(kind: DestinationKind, types: &[String], output_json: bool) -> Result<(), MigrateError> {
    let mapper = mapper_for(kind);
    let mut mapped = Vec::with_capacity(types.len());
    for ty in types {
        let col = map_column(mapper.as_ref(), &ColumnDescriptor::new(ty.as_str(), ty.as_str()))?;
        mapped.push((ty.as_str(), col.data_type));
    }

    if output_json {
        let map: serde_json::Map<String, serde_json::Value> = mapped
            .into_iter()
            .map(|(src, dst)| (src.to_string(), serde_json::Value::String(dst)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (src, dst) in mapped {
            println!("{} -> {}", src, dst);
        }
    }
    Ok(())
}

async fn health_check(config: &Config) -> Result<HealthCheckResult, MigrateError> {
    match config.destination.r#type {
        DestinationKind::Relational => {
            let mysql = config.destination.mysql.as_ref().ok_or_else(|| {
                MigrateError::Config("destination.mysql is required".to_string())
            })?;
            let destination = MysqlDestination::new(mysql)?;
            let health = probe_destination(&destination).await;
            if let Err(e) = destination.close().await {
                warn!("Closing the MySQL pool failed: {}", e);
            }
            Ok(HealthCheckResult::new(None, Some(health)))
        }
        DestinationKind::Analytical => Err(MigrateError::Unsupported(
            "health-check against an analytical destination needs a client library; \
             use the library API with your own Destination implementation"
                .to_string(),
        )),
    }
}

async fn dry_run_migration(
    mut config: Config,
    source: SchemaFileSource,
) -> Result<MigrationResult, MigrateError> {
    config.run.dry_run = true;
    match config.destination.r#type {
        DestinationKind::Relational => {
            let mysql = config.destination.mysql.as_ref().ok_or_else(|| {
                MigrateError::Config("destination.mysql is required".to_string())
            })?;
            let destination = Arc::new(MysqlDestination::new(mysql)?);
            let mut migrator = Migrator::new(config, Arc::new(source), destination.clone())?;
            let result = migrator.migrate().await;

            drop(migrator);
            if let Ok(destination) = Arc::try_unwrap(destination) {
                if let Err(e) = destination.close().await {
                    warn!("Closing the MySQL pool failed: {}", e);
                }
            }
            result
        }
        DestinationKind::Analytical => Err(MigrateError::Unsupported(
            "migrate against an analytical destination needs a client library; \
             use the library API with your own Destination implementation"
                .to_string(),
        )),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
