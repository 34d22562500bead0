use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use event_catalogue::app::ports::PageRendererPort;
use event_catalogue::domain::EventSource;
use event_catalogue::infra::{RenderServiceClient, ReqwestHttp};
use event_catalogue::observability::logging;
use event_catalogue::pipeline::storage::SqliteEventStore;
use event_catalogue::{Config, IngestionOrchestrator};

#[derive(Parser)]
#[command(name = "event_catalogue")]
#[command(about = "Melbourne event catalogue ingester")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape, deduplicate and store events
    Run {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Sources to run (comma-separated). Defaults to the enabled sources in the config
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        /// Event database file, overriding run.store_path
        #[arg(long)]
        store: Option<PathBuf>,
        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List the available sources
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sources => {
            for source in EventSource::ALL {
                println!("{}", source);
            }
            Ok(())
        }
        Commands::Run {
            config,
            sources,
            store,
            timeout_secs,
        } => run(config, sources, store, timeout_secs).await,
    }
}

async fn run(
    config_path: PathBuf,
    sources: Option<Vec<String>>,
    store: Option<PathBuf>,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let _guard = logging::init_logging(&config.run.log_dir);

    let requested: Vec<EventSource> = match sources {
        Some(names) => names
            .iter()
            .map(|n| n.parse())
            .collect::<Result<_, _>>()
            .context("parsing --sources")?,
        None => config.enabled_sources(),
    };
    if requested.is_empty() {
        bail!("no sources enabled");
    }

    let http = ReqwestHttp::new(&config.run.user_agent, config.run.request_timeout())
        .context("building HTTP client")?;
    let renderer: Option<Arc<dyn PageRendererPort>> = config
        .run
        .render_endpoint
        .clone()
        .filter(|_| config.has_renderer())
        .map(|endpoint| {
            Arc::new(RenderServiceClient::new(http.client(), endpoint, config.run.render_token()))
                as Arc<dyn PageRendererPort>
        });
    let store_path = store.unwrap_or_else(|| PathBuf::from(&config.run.store_path));
    let store = SqliteEventStore::open(&store_path)
        .with_context(|| format!("opening event store {}", store_path.display()))?;

    let orchestrator = IngestionOrchestrator::new(
        Arc::new(http),
        renderer,
        Arc::new(store),
        config.run_settings(timeout_secs),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work");
            on_signal.cancel();
        }
    });

    info!(sources = ?requested, store = %store_path.display(), "Starting ingestion run");
    let stats = orchestrator.run(config.source_jobs(&requested), cancel).await;
    println!("{}", stats);

    if stats.all_failed(&requested) {
        bail!("every requested source failed");
    }
    Ok(())
}
