use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use bandcast::config::Config;
use bandcast::ensemble::ledger::ErrorLedger;
use bandcast::model::{parse_horizon, PriceSeries, Role};
use bandcast::registry::store::SqliteRegistryStore;
use bandcast::registry::ModelRegistry;
use bandcast::source::{read_bars_json, InMemoryPriceSource};
use bandcast::{trainer, ForecastOrchestrator};

const USAGE: &str = "usage:
  bandcast forecast <bars.json> <symbol> <horizon> [--sentiment <score>] [--train]
  bandcast train <bars.json> <horizon>
  bandcast history <role> <horizon>
  bandcast rollback <role> <horizon>";

struct ForecastArgs {
    bars: String,
    symbol: String,
    horizon: String,
    sentiment: Option<f64>,
    train: bool,
}

fn parse_forecast_args(args: &[String]) -> Result<ForecastArgs> {
    let mut positional = Vec::new();
    let mut sentiment = None;
    let mut train = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--train" => train = true,
            "--sentiment" => {
                let raw = iter
                    .next()
                    .ok_or_else(|| anyhow!("`--sentiment` requires a score"))?;
                let score: f64 = raw
                    .parse()
                    .with_context(|| format!("invalid sentiment score `{}`", raw))?;
                sentiment = Some(score);
            }
            flag if flag.starts_with("--") => bail!("unknown flag `{}`", flag),
            _ => positional.push(arg.clone()),
        }
    }
    let [bars, symbol, horizon]: [String; 3] = positional
        .try_into()
        .map_err(|_| anyhow!("`forecast` expects <bars.json> <symbol> <horizon>"))?;
    Ok(ForecastArgs {
        bars,
        symbol,
        horizon,
        sentiment,
        train,
    })
}

fn open_registry(config: &Config) -> Result<Arc<ModelRegistry>> {
    let store = SqliteRegistryStore::open(&config.registry.path)?;
    let registry = ModelRegistry::open(Box::new(store))
        .with_context(|| format!("failed to open registry {}", config.registry.path.display()))?;
    Ok(Arc::new(registry))
}

fn load_series(path: &str, symbol: &str) -> Result<PriceSeries> {
    let bars = read_bars_json(Path::new(path))?;
    PriceSeries::new(symbol, bars)
}

fn parse_role(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow!("unknown role `{}`: expected high|mid|low", raw))
}

async fn run_forecast(config: Config, args: &[String]) -> Result<()> {
    let args = parse_forecast_args(args)?;
    let horizon = parse_horizon(&args.horizon)?;
    let series = load_series(&args.bars, &args.symbol)?;
    let registry = open_registry(&config)?;

    if args.train {
        let trained = trainer::train_all(&series.closes(), horizon, &config, &registry)?;
        info!(count = trained.len(), %horizon, "trained roles before forecast");
    }

    let prices = Arc::new(InMemoryPriceSource::new());
    prices.insert(series)?;
    let errors = Arc::new(ErrorLedger::with_window(config.ensemble.history_limit));
    let orchestrator = ForecastOrchestrator::new(config, registry, prices, errors)?;
    let result = orchestrator
        .forecast_with_sentiment(&args.symbol, horizon, args.sentiment)
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_train(config: &Config, args: &[String]) -> Result<()> {
    let [bars, horizon] = args else {
        bail!("`train` expects <bars.json> <horizon>");
    };
    let horizon = parse_horizon(horizon)?;
    let series = load_series(bars, "TRAIN")?;
    let registry = open_registry(config)?;
    let trained = trainer::train_all(&series.closes(), horizon, config, &registry)?;
    println!("{}", serde_json::to_string_pretty(&trained)?);
    Ok(())
}

fn run_history(config: &Config, args: &[String]) -> Result<()> {
    let [role, horizon] = args else {
        bail!("`history` expects <role> <horizon>");
    };
    let registry = open_registry(config)?;
    let versions = registry.history(parse_role(role)?, parse_horizon(horizon)?)?;
    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}

fn run_rollback(config: &Config, args: &[String]) -> Result<()> {
    let [role, horizon] = args else {
        bail!("`rollback` expects <role> <horizon>");
    };
    let registry = open_registry(config)?;
    let version = registry.rollback(parse_role(role)?, parse_horizon(horizon)?)?;
    println!("{}", version);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Set BANDCAST_CONFIG or create config/default.toml");
            std::process::exit(1);
        }
    };

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .json()
        .init();

    let rest = &args[1..];
    match command.as_str() {
        "forecast" => run_forecast(config, rest).await,
        "train" => run_train(&config, rest),
        "history" => run_history(&config, rest),
        "rollback" => run_rollback(&config, rest),
        other => bail!(
            "unknown subcommand `{}`. expected one of: forecast|train|history|rollback",
            other
        ),
    }
}
