//! Cryptonest CLI: universe, dataset, dashboard and config commands.
//!
//! Commands:
//! - `universe build`: reconstruct the monthly top-N universe and save it
//! - `dataset build`: assemble the research dataset for the saved universe
//! - `dashboard`: month-to-date dataset for today's top-N
//! - `config init`: write a default config file

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cryptonest_core::source::Source;
use cryptonest_pipeline::dataset_build::DatasetBuild;
use cryptonest_pipeline::fetch::FetchReport;
use cryptonest_pipeline::run::{run_dashboard, run_dataset_build, run_universe_build};
use cryptonest_pipeline::{PipelineConfig, TracingProgress};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = "cryptonest.toml";

#[derive(Parser)]
#[command(
    name = "cryptonest",
    about = "Cryptonest, point-in-time crypto universe and dataset builder"
)]
struct Cli {
    /// Path to the TOML config file. Built-in defaults are used when the
    /// default file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Run as of this date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    as_of: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Point-in-time universe commands.
    Universe {
        #[command(subcommand)]
        action: UniverseAction,
    },
    /// Research dataset commands.
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },
    /// Build the month-to-date dashboard dataset for the current top-N.
    Dashboard,
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UniverseAction {
    /// Reconstruct the monthly universe from market-cap history.
    Build,
}

#[derive(Subcommand)]
enum DatasetAction {
    /// Fetch, merge and write the dataset for the saved universe.
    Build,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config {
            action: ConfigAction::Init { force },
        } => run_config_init(&cli.config, force),
        command => {
            let config = load_config(&cli.config)?;
            let today = as_of(cli.as_of.as_deref())?;
            run_command(command, &config, today)
        }
    }
}

fn run_command(command: Commands, config: &PipelineConfig, today: NaiveDate) -> Result<()> {
    let progress = TracingProgress;
    match command {
        Commands::Universe {
            action: UniverseAction::Build,
        } => {
            let build = run_universe_build(config, today, &progress)?;
            println!();
            println!("=== Universe ===");
            println!("Candidates:     {}", build.pool.len());
            println!("Months:         {}", build.snapshot.len());
            if let (Some(first), Some(last)) = (build.snapshot.first_month(), build.snapshot.last_month()) {
                println!("Period:         {first} to {last}");
            }
            println!("Unique coins:   {}", build.snapshot.unique_entities().len());
            print_report(&build.market);
            println!("Saved to:       {}", config.output.universe_file.display());
            println!();
        }
        Commands::Dataset {
            action: DatasetAction::Build,
        } => {
            let build = run_dataset_build(config, today, &progress)?;
            print_dataset("Dataset", &build, &config.output.dataset_file);
        }
        Commands::Dashboard => {
            let build = run_dashboard(config, today, &progress)?;
            print_dataset("Dashboard", &build, &config.output.dashboard_file);
        }
        Commands::Config { .. } => bail!("config commands do not load a config"),
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::info!("no {DEFAULT_CONFIG} found, using built-in defaults");
        return Ok(PipelineConfig::default());
    }
    PipelineConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn as_of(raw: Option<&str>) -> Result<NaiveDate> {
    Ok(raw
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--as-of must be YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive()))
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let text = PipelineConfig::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn print_report<P>(report: &FetchReport<P>) {
    let label = match report.source {
        Source::Market => "Market",
        Source::OnChain => "On-chain",
        Source::Social => "Social",
    };
    println!(
        "{:<15} {} fetched ({} cached, {} new), {} failed",
        format!("{label}:"),
        report.payloads.len(),
        report.hits,
        report.misses,
        report.failures.len()
    );
    for (entity, err) in report.failures.iter().take(5) {
        println!("  WARNING: {entity}: {err}");
    }
    if report.failures.len() > 5 {
        println!("  ... and {} more", report.failures.len() - 5);
    }
}

fn print_dataset(title: &str, build: &DatasetBuild, path: &Path) {
    println!();
    println!("=== {title} ===");
    println!("Rows:           {}", build.records.len());
    println!("Coins:          {}", build.canonical_entities());
    if let (Some(first), Some(last)) = (
        build.records.iter().map(|r| r.date).min(),
        build.records.iter().map(|r| r.date).max(),
    ) {
        println!("Period:         {first} to {last}");
    }
    println!("Collisions:     {}", build.collisions.len());
    print_report(&build.market);
    print_report(&build.on_chain);
    print_report(&build.social);
    println!("Saved to:       {}", path.display());
    println!();
}
