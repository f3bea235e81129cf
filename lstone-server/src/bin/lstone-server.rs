/// Linkstone status-checker server binary
///
/// Loads tracked links, runs the background link-health checker, and serves
/// /metrics, /health, /ready and the link status API until Ctrl-C.

use clap::Parser;
use lstone_checker::{metrics, CancellationToken, StatusChecker};
use lstone_core::{CheckerConfig, StatusRepository};
use lstone_server::{load_repository, router, save_repository, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lstone-server")]
#[command(about = "Linkstone link-health checker", long_about = None)]
struct Args {
    /// JSON file with tracked links and their last known state
    #[arg(short, long, value_name = "PATH", env = "LSTONE_LINKS_FILE")]
    links_file: PathBuf,

    /// Host to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1", env = "LSTONE_HOST")]
    host: String,

    /// Port for the HTTP server
    #[arg(short, long, default_value = "9090", env = "LSTONE_PORT")]
    port: u16,

    /// Do not run the background checker
    #[arg(long, env = "LSTONE_CHECKER_DISABLED")]
    disabled: bool,

    /// Seconds between passes
    #[arg(long, default_value = "300", env = "LSTONE_POLL_INTERVAL")]
    poll_interval: u64,

    /// Seconds before an alive link is rechecked
    #[arg(long, default_value = "21600", env = "LSTONE_ALIVE_RECHECK")]
    alive_recheck: u64,

    /// Seconds before a gone link is rechecked
    #[arg(long, default_value = "86400", env = "LSTONE_GONE_RECHECK")]
    gone_recheck: u64,

    /// Links checked per pass
    #[arg(long, default_value = "100", env = "LSTONE_BATCH_SIZE")]
    batch_size: usize,

    /// Maximum probes in flight
    #[arg(long, default_value = "5", env = "LSTONE_CONCURRENCY")]
    concurrency: usize,

    /// Skip web-archive lookups for gone links
    #[arg(long, env = "LSTONE_NO_ARCHIVE")]
    no_archive: bool,

    /// Seconds before a gone link's archive snapshot is looked up again
    #[arg(long, default_value = "604800", env = "LSTONE_ARCHIVE_RECHECK")]
    archive_recheck: u64,

    /// Product name sent in the User-Agent header
    #[arg(long, default_value = "linkstone", env = "LSTONE_PRODUCT_NAME")]
    product_name: String,

    /// Run a single pass, save, and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn checker_config(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_enabled(!self.disabled)
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_alive_recheck_interval(Duration::from_secs(self.alive_recheck))
            .with_gone_recheck_interval(Duration::from_secs(self.gone_recheck))
            .with_batch_size(self.batch_size)
            .with_concurrency(self.concurrency)
            .with_archive_lookup(!self.no_archive)
            .with_archive_recheck_interval(Duration::from_secs(self.archive_recheck))
            .with_product_name(self.product_name.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to info level, can override with RUST_LOG env var
    // Example: RUST_LOG=lstone_checker=debug lstone-server --links-file links.json
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    metrics::register_metrics()?;
    info!("Initialized Prometheus metrics");

    let args = Args::parse();
    let config = args.checker_config();
    config.validate()?;

    let repository = Arc::new(load_repository(&args.links_file)?);
    let store: Arc<dyn StatusRepository> = repository.clone();
    let checker = Arc::new(StatusChecker::new(config, store.clone())?);
    let cancel = CancellationToken::new();

    if args.once {
        let report = checker.run_once(cancel).await?;
        info!(
            due = report.due,
            alive = report.alive,
            gone = report.gone,
            "Single pass complete"
        );
        save_repository(&repository, &args.links_file)?;
        return Ok(());
    }

    let app = router(AppState {
        repository: store,
        checker: Arc::clone(&checker),
        cancel: cancel.clone(),
    });
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting HTTP server on {} with /metrics, /health, /ready endpoints", addr);

    checker.start(cancel.clone()).await;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    checker.shutdown().await;
    save_repository(&repository, &args.links_file)?;

    Ok(())
}
