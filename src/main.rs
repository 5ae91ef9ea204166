use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_relay::bot::RelayBot;
use media_relay::extractors::thumbnail::HttpThumbnailSource;
use media_relay::extractors::ytdlp::YtDlpExtractor;
use media_relay::relay::WorkerPool;
use media_relay::transport::local::LocalTransport;
use media_relay::{utils, Cli, Commands, Config, FetchOrchestrator, JobGate, JobOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = Config::load(cli.config.as_deref()).await?;
    if let Some(outbox) = cli.outbox.clone() {
        config.transport.outbox_dir = Some(outbox);
    }

    match cli.command {
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the configuration file to change settings:");
                match cli.config {
                    Some(path) => println!("  {}", path.display()),
                    None => println!("  {}", Config::config_path()?.display()),
                }
            }
        }
        Commands::Check => {
            let missing = utils::check_dependencies(&config.extractor.yt_dlp_path).await;
            if missing.is_empty() {
                println!("All external tools are available");
            } else {
                for dep in &missing {
                    eprintln!("   • missing: {}", dep);
                }
                anyhow::bail!("{} required tools are missing", missing.len());
            }
        }
        Commands::Serve => {
            warn_missing_dependencies(&config).await;
            let bot = RelayBot::new(Arc::new(build_orchestrator(&config)?), config.policy.clone());

            tracing::info!("Serving commands from stdin (`<user_id> /dl <url>`)");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            bot.serve(stdin).await?;
        }
        Commands::Dl { url } => run_once(&config, media_relay::MediaKind::Video, &url).await?,
        Commands::Adl { url } => run_once(&config, media_relay::MediaKind::Audio, &url).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "media_relay=debug" } else { "media_relay=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn warn_missing_dependencies(config: &Config) {
    // Non-fatal: tools may be provided some other way in containers
    let missing = utils::check_dependencies(&config.extractor.yt_dlp_path).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

fn build_orchestrator(config: &Config) -> Result<FetchOrchestrator> {
    Ok(FetchOrchestrator::new(
        Arc::new(YtDlpExtractor::with_path(config.extractor.yt_dlp_path.clone())),
        Arc::new(LocalTransport::new(config.outbox_dir())),
        Arc::new(HttpThumbnailSource::new()?),
        JobGate::default(),
        WorkerPool::new(config.relay.workers),
        config.relay_settings(),
    ))
}

/// Run a single job for the local user and exit non-zero unless it completed
async fn run_once(config: &Config, kind: media_relay::MediaKind, url: &str) -> Result<()> {
    let url = utils::validate_and_normalize_url(url)?;
    warn_missing_dependencies(config).await;

    let orchestrator = Arc::new(build_orchestrator(config)?);
    let bot = RelayBot::new(orchestrator.clone(), config.policy.clone());
    let request = bot.request_for(0, 0, kind, &url);

    let mut job = tokio::spawn(async move { orchestrator.run(request).await });

    let outcome = tokio::select! {
        joined = &mut job => joined?,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the aborted job runs its cleanup guards
            job.abort();
            let _ = job.await;
            anyhow::bail!("Interrupted");
        }
    };

    match outcome {
        JobOutcome::Completed => {
            println!("Delivered to {}", config.outbox_dir().join("0").display());
            Ok(())
        }
        JobOutcome::Busy => anyhow::bail!("a job is already running"),
        JobOutcome::Rejected(violation) => anyhow::bail!("Rejected: {}", violation),
        JobOutcome::Failed(e) => Err(e.into()),
    }
}
