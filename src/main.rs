use anyhow::Context;
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::Parser;
use dotenv::dotenv;
use evoalloc::market_data::{CsvPriceProvider, YahooChartProvider};
use evoalloc::{run, AssetUniverse, Envelope, EvolutionConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Genetic-algorithm portfolio allocation. Prints a single JSON document to stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Comma-separated tickers, e.g. "BBCA.JK,ADRO.JK,ANTM.JK"
    tickers: String,

    /// Risk-aversion coefficient applied to portfolio volatility
    #[arg(allow_negative_numbers = true)]
    risk_aversion: f64,

    /// First date of price history to use
    #[arg(long, default_value = "2022-01-01")]
    start_date: NaiveDate,

    /// Read closing prices from this CSV file instead of Yahoo Finance
    #[arg(long)]
    prices: Option<PathBuf>,

    /// JSON file with evolution parameters
    #[arg(long, env = "EVOALLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides the configured number of generations
    #[arg(long)]
    generations: Option<usize>,

    /// Overrides the configured population size
    #[arg(long)]
    population_size: Option<usize>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<EvolutionConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => EvolutionConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
    }
    if let Some(generations) = cli.generations {
        config.generations = generations;
    }
    if let Some(population_size) = cli.population_size {
        config.population_size = population_size;
    }
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<EvolutionConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

async fn execute(cli: &Cli) -> anyhow::Result<Envelope> {
    let config = load_config(cli)?;
    let universe = AssetUniverse::parse(&cli.tickers)?;

    let report = match &cli.prices {
        Some(path) => {
            let provider = CsvPriceProvider::new(path);
            run(&provider, &universe, cli.start_date, cli.risk_aversion, &config).await?
        }
        None => {
            let provider = YahooChartProvider::new()?;
            run(&provider, &universe, cli.start_date, cli.risk_aversion, &config).await?
        }
    };
    Ok(Envelope::Success(report))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    // stdout is reserved for the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("{}", Envelope::error(e.to_string().trim()).to_json(false));
            return ExitCode::FAILURE;
        }
    };

    match execute(&cli).await {
        Ok(envelope) => {
            println!("{}", envelope.to_json(cli.pretty));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("optimization failed: {e:#}");
            println!("{}", Envelope::error(format!("{e:#}")).to_json(cli.pretty));
            ExitCode::FAILURE
        }
    }
}
