use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rale_sync::{connect_engine, LevelingConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rale-cli")]
#[command(about = "Regional activity leveling command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute proposer levels once
    Compute(ComputeArgs),
    /// Run the weekly trigger until interrupted
    Schedule,
    /// Print the effective window and scoring configuration
    ShowConfig,
}

#[derive(Debug, Default, Args)]
struct ComputeArgs {
    /// Window start, ISO-8601 (e.g. 2025-08-18T00:00:00+09:00). Requires --end.
    #[arg(long)]
    start: Option<String>,
    /// Window end, ISO-8601. Requires --start.
    #[arg(long)]
    end: Option<String>,
    /// Only process these proposer ids
    #[arg(long, num_args = 1..)]
    ids: Vec<String>,
    /// Print the full run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = LevelingConfig::from_env();

    match cli
        .command
        .unwrap_or_else(|| Commands::Compute(ComputeArgs::default()))
    {
        Commands::Compute(args) => compute(&config, args).await?,
        Commands::Schedule => schedule(&config).await?,
        Commands::ShowConfig => show_config(&config)?,
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new("info").context("building log filter")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}

async fn compute(config: &LevelingConfig, args: ComputeArgs) -> Result<()> {
    let window = config
        .window_resolver()
        .resolve(args.start.as_deref(), args.end.as_deref(), Utc::now())
        .context("resolving aggregation window")?;
    let engine = connect_engine(config).await?;
    let only = (!args.ids.is_empty()).then_some(args.ids.as_slice());
    let summary = engine.run(window, only).await?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serializing run summary")?
        );
    } else {
        println!(
            "compute complete: run_id={} window={} {}",
            summary.run_id,
            summary.window,
            summary.summary_line()
        );
    }
    Ok(())
}

async fn schedule(config: &LevelingConfig) -> Result<()> {
    let engine = Arc::new(connect_engine(config).await?);
    let mut sched = engine.build_scheduler(&config.cron).await?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %config.cron, "leveling scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down leveling scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

fn show_config(config: &LevelingConfig) -> Result<()> {
    let scoring = config.score_config()?;
    let view = serde_json::json!({
        "window_days": config.window_days,
        "utc_offset": config.utc_offset.to_string(),
        "cron": config.cron,
        "scoring_path": config.scoring_path.as_ref().map(|p| p.display().to_string()),
        "scoring": scoring,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&view).context("serializing configuration")?
    );
    Ok(())
}
