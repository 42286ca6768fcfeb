#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use clap::Parser;
use discobox_router::config::{RouterConfig, StorageConfig};
use discobox_router::request::Request;
use discobox_router::routing::MatchOutcome;
use discobox_router::storage::etcd::EtcdStorage;
use discobox_router::storage::memory::InMemoryStorage;
use discobox_router::storage::StorageClient;
use discobox_router::{runtime, ReloadController};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Non-blocking JSON logging to stdout — a lagging subscriber drops lines
/// rather than backpressuring the router itself on log I/O.
fn init_tracing() {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    // Leaked deliberately: the guard must outlive every log call for the
    // life of the process, and this binary has no earlier point to own it.
    std::mem::forget(guard);
}

#[derive(Parser)]
#[command(name = "discobox-router", about = "Reverse proxy routing core: match requests against a live route table")]
struct Cli {
    /// Path to router config file (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

/// A line-oriented demo harness: reads `host path [header: value ...]` lines
/// from stdin and prints the match outcome for each. This is not a proxy
/// frontend — forwarding a matched request to its service is explicitly out
/// of scope here; this binary exists to exercise the routing core directly.
fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let worker_threads = runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let _metrics = discobox_router::metrics::Metrics::install();
    let config = RouterConfig::load(&cli.config)?;

    let storage: Arc<dyn StorageClient> = match config.storage {
        StorageConfig::Memory => {
            tracing::info!("using in-memory storage backend (no persisted routes)");
            Arc::new(InMemoryStorage::new())
        }
        StorageConfig::Etcd { endpoints, key_prefix } => {
            let endpoint = endpoints
                .first()
                .ok_or_else(|| anyhow::anyhow!("etcd storage backend has no endpoints"))?;
            tracing::info!(endpoint, key_prefix, "using etcd storage backend");
            Arc::new(EtcdStorage::new(endpoint.clone(), &key_prefix))
        }
    };

    let controller = ReloadController::start(storage, config.reload).await?;
    let matcher = controller.matcher();

    eprintln!("discobox-router ready. enter lines as: <host> <path> [header=value ...]");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(host), Some(path)) = (parts.next(), parts.next()) else {
            eprintln!("expected: <host> <path> [header=value ...]");
            continue;
        };

        let mut request = Request::new(host, path);
        for pair in parts {
            if let Some((name, value)) = pair.split_once('=') {
                request = request.header(name, value);
            }
        }

        match matcher.match_request(&request) {
            MatchOutcome::Matched {
                route_id,
                service_id,
                captures,
            } => {
                metrics::counter!("discobox_match_total", "result" => "matched").increment(1);
                println!("matched route={route_id} service={service_id} captures={captures:?}");
            }
            MatchOutcome::NotFound => {
                metrics::counter!("discobox_match_total", "result" => "not_found").increment(1);
                println!("no route matched");
            }
        }
    }

    controller.close().await;
    Ok(())
}
