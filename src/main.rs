mod db;
mod decoding;
mod layers;
mod pipeline;
mod raw_data;
mod rpc;
mod storage;
#[cfg(test)]
mod testing;
mod transformations;
mod types;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use db::PostgresTableSink;
use layers::LayeredWriter;
use pipeline::{BatchReport, PipelineContext};
use rpc::{ChainRpc, RpcClient, RpcClientConfig};
use storage::LocalObjectStore;
use types::config::pipeline::PipelineConfig;

/// Loads blockchain blocks into a bronze/silver/gold lakehouse.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Pipeline configuration file.
    #[arg(short, long, env = "LAKEHOUSE_CONFIG", default_value = "config/config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetches an inclusive block range and writes every layer.
    Run {
        /// First block of the range.
        #[arg(short, long)]
        start: u64,
        /// Last block of the range (inclusive).
        #[arg(short, long)]
        end: u64,
        /// Blocks per batch; overrides the config file.
        #[arg(short, long)]
        batch_size: Option<u64>,
    },
    /// Re-derives silver and gold for one batch from its bronze data.
    Replay {
        /// Batch identifier, `<start>-<end>`.
        #[arg(long)]
        batch_id: String,
    },
    /// Prints the row count of every warehouse table.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(&cli.config)?;
    tracing::info!(
        "Loaded config for chain {} from {}",
        config.chain.name,
        cli.config.display()
    );

    match cli.command {
        Command::Run {
            start,
            end,
            batch_size,
        } => {
            load_required_env_vars(&config.required_env_vars())?;
            let client = build_client(&config)?;
            let pipeline = build_pipeline(&config, batch_size)
                .await?
                .with_client(client);

            let reports = pipeline.run(start, end).await?;
            log_summary(&reports);
            log_table_counts(&pipeline).await?;
        }
        Command::Replay { batch_id } => {
            load_required_env_vars(&[config.warehouse.database_url_env_var.as_str()])?;
            let pipeline = build_pipeline(&config, None).await?;

            let report = pipeline.replay(&batch_id).await?;
            log_summary(&[report]);
            log_table_counts(&pipeline).await?;
        }
        Command::Stats => {
            load_required_env_vars(&[config.warehouse.database_url_env_var.as_str()])?;
            let pipeline = build_pipeline(&config, None).await?;
            log_table_counts(&pipeline).await?;
        }
    }

    Ok(())
}

/// Ensures all required env vars are set, loading .env if needed.
fn load_required_env_vars(required: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    dotenvy::dotenv().with_context(|| {
        format!(
            "Missing env vars {:?} and failed to load .env file",
            missing
        )
    })?;

    let still_missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    anyhow::ensure!(
        still_missing.is_empty(),
        "Missing required env vars after loading .env: {:?}",
        still_missing
    );

    Ok(())
}

fn build_client(config: &PipelineConfig) -> anyhow::Result<Arc<dyn ChainRpc>> {
    let chain = &config.chain;
    let rpc_url = env::var(&chain.rpc_url_env_var).with_context(|| {
        format!(
            "env var {} not set for chain {}",
            chain.rpc_url_env_var, chain.name
        )
    })?;
    let mut client_config = RpcClientConfig::from_url(&rpc_url)
        .with_context(|| format!("env var {} is not a valid URL", chain.rpc_url_env_var))?;
    if let Some(rate_limit) = chain.rate_limit() {
        tracing::info!(
            "Rate limiting RPC calls to {} per second",
            rate_limit.requests_per_second
        );
        client_config = client_config.with_rate_limit(rate_limit);
    }

    let client = RpcClient::new(client_config);
    tracing::info!("Using RPC endpoint {}", client.endpoint());
    Ok(Arc::new(client))
}

async fn build_pipeline(
    config: &PipelineConfig,
    batch_size: Option<u64>,
) -> anyhow::Result<PipelineContext> {
    let warehouse = &config.warehouse;
    let database_url = env::var(&warehouse.database_url_env_var).with_context(|| {
        format!(
            "env var {} not set for the warehouse",
            warehouse.database_url_env_var
        )
    })?;
    let sink = PostgresTableSink::connect(&database_url, warehouse.write_mode)
        .await
        .context("failed to create database pool")?;

    let store = LocalObjectStore::new(&config.bronze.root);
    let writer = LayeredWriter::new(Arc::new(store), Arc::new(sink), config.bronze.bucket.clone());

    let pipeline = PipelineContext::new(writer)
        .with_retry(config.retry.to_retry_config())
        .with_enrich_options(config.chain.enrich_options())
        .with_batch_size(batch_size.unwrap_or(config.batch_size));

    pipeline
        .prepare()
        .await
        .context("failed to prepare bronze bucket and warehouse tables")?;
    tracing::info!("Bronze bucket and warehouse tables ready");

    Ok(pipeline)
}

fn log_summary(reports: &[BatchReport]) {
    let blocks: usize = reports.iter().map(|r| r.blocks).sum();
    let facts: usize = reports.iter().map(|r| r.fact_rows).sum();
    let skipped: usize = reports.iter().map(|r| r.skipped_transactions).sum();
    tracing::info!(
        "Processed {} batch(es): {} blocks, {} fact rows, {} transactions skipped",
        reports.len(),
        blocks,
        facts,
        skipped
    );
}

async fn log_table_counts(pipeline: &PipelineContext) -> anyhow::Result<()> {
    let counts = pipeline
        .table_counts()
        .await
        .context("failed to count warehouse rows")?;
    for (table, rows) in counts {
        tracing::info!("{}: {} row(s)", table, rows);
    }
    Ok(())
}
