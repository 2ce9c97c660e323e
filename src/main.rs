use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vehicle_feed::{
    decoder::get_decoder,
    ingester::{Ingester, KafkaSource},
    poller::{HttpFeed, Poller},
    publisher::{KafkaTopic, Publisher},
    settings::Settings,
    store::PgStore,
};

const PRODUCER_DRAIN: Duration = Duration::from_secs(10);

#[doc(hidden)]
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Poll the feed and publish observations
    Collect,
    /// Consume observations and persist them
    Persist,
    /// Both of the above
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::new(&args.config).context("cannot load config")?;

    let shutdown = CancellationToken::new();
    let mut tasks = JoinSet::new();

    if matches!(args.command, Command::Collect | Command::Run) {
        let decoder = get_decoder(&settings.feed.decoder, &settings.feed)?;
        let feed = HttpFeed::new(&settings.feed).context("creating http client")?;
        let topic = KafkaTopic::new(&settings.kafka).context("creating kafka producer")?;
        let poller = Poller::new(
            feed,
            decoder,
            Publisher::new(topic),
            Duration::from_secs(settings.feed.poll_interval_seconds),
        );
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            poller.start(shutdown).await;
            poller.publisher().topic().flush(PRODUCER_DRAIN);
        });
    }

    if matches!(args.command, Command::Persist | Command::Run) {
        let store = PgStore::new(&settings.postgres).context("creating postgres pool")?;
        if settings.postgres.bootstrap_schema {
            store.bootstrap().await.context("creating observation table")?;
        }
        let source = KafkaSource::new(&settings.kafka).context("creating kafka consumer")?;
        let ingester = Ingester::new(source, store, &settings.ingester);
        let shutdown = shutdown.clone();
        tasks.spawn(async move { ingester.start(shutdown).await });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
        // a loop only returns on cancellation, so an early exit is a panic
        Some(_) = tasks.join_next() => error!("worker exited unexpectedly"),
    }
    shutdown.cancel();
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "worker failed");
        }
    }
    Ok(())
}
