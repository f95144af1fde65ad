mod fixture;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use fixture::{GraphFixture, LoadedGraph};
use serde::Serialize;
use slograph_core::{
    ConfigManager, DiscoverySource, GraphStore, LoggingConfig, SloGraphConfig, TraversalDepth,
    TraversalDirection,
};
use slograph_graph::{compute_confidence, refresh_cycle_alerts};
use slograph_reliability::{AnalysisRequest, ConstraintAnalyzer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "slograph")]
#[command(about = "SloGraph CLI - Service dependency graph and SLO feasibility analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Graph file with ingestion batches and telemetry
    #[arg(long, global = true, env = "SLOGRAPH_GRAPH")]
    graph: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the dependency subgraph around a service
    Traverse {
        /// Starting service business id
        service: String,

        /// Direction to walk
        #[arg(short, long, value_enum, default_value = "downstream")]
        direction: DirectionArg,

        /// Maximum hop count (1-10); defaults to the configured depth
        #[arg(long)]
        depth: Option<u32>,

        /// Follow edges flagged stale
        #[arg(long)]
        include_stale: bool,
    },

    /// Detect circular dependencies and reconcile cycle alerts
    Cycles,

    /// Compute the achievable availability of a service against an SLO target
    Analyze {
        /// Target service business id
        service: String,

        /// SLO target in percent; defaults to the configured target
        #[arg(short, long)]
        target: Option<f64>,

        /// Telemetry lookback window in days
        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Show the confidence score an edge observation would receive
    Confidence {
        /// Discovery source of the observation
        #[arg(value_enum)]
        source: SourceArg,

        /// Number of times the edge was observed
        #[arg(default_value = "1")]
        observations: u32,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Destination; defaults to ./.slograph.toml
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Upstream,
    Downstream,
    Both,
}

impl From<DirectionArg> for TraversalDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Upstream => TraversalDirection::Upstream,
            DirectionArg::Downstream => TraversalDirection::Downstream,
            DirectionArg::Both => TraversalDirection::Both,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Manual,
    Mesh,
    Trace,
    Platform,
}

impl From<SourceArg> for DiscoverySource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Manual => DiscoverySource::Manual,
            SourceArg::Mesh => DiscoverySource::Mesh,
            SourceArg::Trace => DiscoverySource::Trace,
            SourceArg::Platform => DiscoverySource::Platform,
        }
    }
}

// Output structures
#[derive(Serialize)]
struct ConfidenceResult {
    source: DiscoverySource,
    observations: u32,
    base_confidence: f64,
    confidence: f64,
}

#[derive(Serialize)]
struct ConfigResult {
    config_path: Option<String>,
    config: SloGraphConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.config().logging, cli.verbose);

    match execute_command(&cli, &config).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Logs are written to stderr; stdout carries command output only.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("{} {}", "Warning:".yellow(), e);
    }
}

async fn execute_command(cli: &Cli, config: &ConfigManager) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::Traverse {
            service,
            direction,
            depth,
            include_stale,
        } => {
            let graph = load_graph(cli, config.config()).await?;
            let depth = TraversalDepth::new(depth.unwrap_or(config.config().traversal.default_depth))
                .context("Invalid traversal depth")?;
            let include_stale = *include_stale || config.config().traversal.include_stale;
            let subgraph = graph
                .store
                .subgraph(service, (*direction).into(), depth, include_stale)
                .await
                .with_context(|| format!("Failed to traverse from {}", service))?;
            Ok(serde_json::to_value(subgraph)?)
        }

        Commands::Cycles => {
            let graph = load_graph(cli, config.config()).await?;
            let outcome = refresh_cycle_alerts(graph.store.as_ref(), chrono::Utc::now())
                .await
                .context("Cycle detection failed")?;
            Ok(serde_json::json!({
                "cycles": outcome.detected_cycles(),
                "opened": outcome.opened,
                "active": outcome.active,
                "cleared": outcome.cleared,
            }))
        }

        Commands::Analyze {
            service,
            target,
            lookback_days,
        } => {
            let graph = load_graph(cli, config.config()).await?;
            let analysis = &config.config().analysis;
            let mut request = AnalysisRequest::with_defaults(service.clone(), analysis);
            if let Some(target) = target {
                request.slo_target_pct = *target;
            }
            if let Some(days) = lookback_days {
                request.lookback = Duration::from_secs(u64::from(*days) * 86_400);
            }

            let analyzer = ConstraintAnalyzer::new(graph.store, graph.telemetry, analysis.clone());
            let result = analyzer
                .analyze(&request)
                .await
                .with_context(|| format!("Analysis of {} failed", service))?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::Confidence {
            source,
            observations,
        } => {
            let source: DiscoverySource = (*source).into();
            let result = ConfidenceResult {
                source,
                observations: *observations,
                base_confidence: source.base_confidence(),
                confidence: compute_confidence(source, *observations),
            };
            Ok(serde_json::to_value(result)?)
        }

        Commands::Config(cmd) => execute_config_command(cmd, config),
    }
}

fn execute_config_command(cmd: &ConfigCommands, config: &ConfigManager) -> Result<serde_json::Value> {
    match cmd {
        ConfigCommands::Show => {
            let result = ConfigResult {
                config_path: config.config_path().map(|p| p.display().to_string()),
                config: config.config().clone(),
            };
            Ok(serde_json::to_value(result)?)
        }
        ConfigCommands::Init { path } => {
            let path = path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".slograph.toml"));
            if path.exists() {
                anyhow::bail!("{} already exists", path.display());
            }
            ConfigManager::create_default_config(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(serde_json::json!({ "created": path.display().to_string() }))
        }
    }
}

async fn load_graph(cli: &Cli, config: &SloGraphConfig) -> Result<LoadedGraph> {
    let path: &Path = cli
        .graph
        .as_deref()
        .context("No graph file given; pass --graph or set SLOGRAPH_GRAPH")?;
    let fixture = GraphFixture::load(path)?;
    let graph = fixture::build(fixture, &config.ingestion).await?;
    if cli.verbose {
        for report in &graph.reports {
            eprintln!(
                "{} v{} inserted={} refreshed={} overridden={} retained={} placeholders={}",
                "ingested".cyan(),
                report.version,
                report.inserted,
                report.refreshed,
                report.overridden,
                report.retained,
                report.placeholders.len()
            );
        }
        eprintln!("{} {}", "stale edges:".cyan(), graph.stale_edges);
    }
    Ok(graph)
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value, 0)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value, indent: usize) -> Result<()> {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}{}: {}", pad, key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}{}: {}", pad, key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}{}: {}", pad, key_colored, val_colored);
                    }
                    serde_json::Value::Null => {
                        println!("{}{}: {}", pad, key_colored, "-".dimmed());
                    }
                    _ => {
                        println!("{}{}:", pad, key_colored);
                        print_pretty(val, indent + 1)?;
                    }
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                match item {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}{}{}:", pad, "- item ".cyan(), (i + 1).to_string().yellow());
                        print_pretty(item, indent + 1)?;
                    }
                    _ => println!("{}- {}", pad, item),
                }
            }
        }
        _ => {
            println!("{}{}", pad, value);
        }
    }
    Ok(())
}
