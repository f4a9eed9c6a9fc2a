//! Command-line shell for hangar.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::ClientConfig;
use hangar_cache::DiskCache;
use hangar_client::{CancellationToken, PullContext, Registry, Trace, TransferStatus};
use hangar_core::{Layer, ModelRef};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hangar")]
#[command(about = "Pull and manage content-addressed model artifacts")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, env = "HANGAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull a model from a registry into the local cache
    Pull {
        /// Model reference, e.g. `registry.example.com/library/llama:latest`
        reference: String,
    },
    /// List models in the local cache
    List,
    /// Show the layers of a cached model
    Show { reference: String },
    /// Remove a model from the local index (blobs are left for GC)
    Rm { reference: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref())?;
    let cache = Arc::new(
        DiskCache::open(&config.cache_dir)
            .await
            .with_context(|| format!("failed to open cache at {}", config.cache_dir.display()))?,
    );

    match cli.command {
        Commands::Pull { reference } => pull(cache, &config, &reference).await,
        Commands::List => list(cache).await,
        Commands::Show { reference } => show(cache, &reference).await,
        Commands::Rm { reference } => rm(cache, &reference).await,
    }
}

async fn pull(cache: Arc<DiskCache>, config: &ClientConfig, reference: &str) -> Result<()> {
    let mut registry = Registry::new(cache);
    registry.max_streams = config.max_streams;
    registry.chunking_threshold = config.chunking_threshold;
    tracing::debug!(
        max_streams = registry.max_streams,
        chunking_threshold = registry.chunking_threshold,
        "starting pull"
    );

    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg} {bytes} ({bytes_per_sec})")?,
    );
    bar.set_message(format!("pulling {reference}"));

    // Ctrl-C cancels the pull; verified chunks stay cached for a resume.
    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
    }

    let trace: Arc<dyn Trace> = {
        let bar = bar.clone();
        Arc::new(move |_layer: &Layer, n: u64, _status: TransferStatus<'_>| {
            bar.inc(n);
        })
    };
    let ctx = PullContext::new()
        .with_cancellation(token)
        .with_trace(trace);

    registry
        .pull(&ctx, reference)
        .await
        .with_context(|| format!("failed to pull {reference}"))?;
    bar.finish_and_clear();
    println!("pulled {reference}");
    Ok(())
}

async fn list(cache: Arc<DiskCache>) -> Result<()> {
    for name in cache.manifests().await? {
        println!("{name}");
    }
    Ok(())
}

async fn show(cache: Arc<DiskCache>, reference: &str) -> Result<()> {
    let name = ModelRef::parse(reference)?;
    let manifest = cache
        .resolve(&name)
        .await
        .with_context(|| format!("{name} is not in the local cache"))?;

    for layer in manifest.blobs() {
        println!("{}  {:>12}  {}", layer.digest.short(), layer.size, layer.digest);
    }
    println!("total: {} bytes", manifest.total_size());
    Ok(())
}

async fn rm(cache: Arc<DiskCache>, reference: &str) -> Result<()> {
    let name = ModelRef::parse(reference)?;
    if cache.unlink(&name).await? {
        println!("removed {name}");
    } else {
        println!("{name} is not in the local cache");
    }
    Ok(())
}
