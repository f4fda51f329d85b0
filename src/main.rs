use anyhow::Context;
use clap::Parser;
use distributed_router::membership::service::MembershipService;
use distributed_router::membership::types::{NodeId, PeerHandle};
use distributed_router::router::config::{
    DEFAULT_CACHE_SIZE, DEFAULT_REPLICA_COUNT, RouterConfig,
};
use distributed_router::router::handlers;
use distributed_router::router::service::RouterService;
use distributed_router::router::transport::HttpTransport;
use distributed_router::storage::Storage;
use distributed_router::storage::memory::MemoryStorage;
use distributed_router::storage::partitioner::PartitionManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// HTTP listens on the gossip port shifted by this much.
const HTTP_PORT_OFFSET: u16 = 1000;

#[derive(Parser, Debug)]
#[command(name = "router-node", about = "Read router node of a sharded, replicated table store")]
struct Args {
    /// Gossip (UDP) address; HTTP uses the same ip with the port + 1000
    #[arg(long, env = "ROUTER_BIND")]
    bind: SocketAddr,

    /// Gossip address of an existing node (repeatable)
    #[arg(long = "seed", env = "ROUTER_SEEDS", value_delimiter = ',')]
    seeds: Vec<SocketAddr>,

    /// Node id, random when omitted
    #[arg(long, env = "ROUTER_LOCAL_ID")]
    local_id: Option<String>,

    /// Budget for one request across all hops, e.g. "5s" or "750ms"
    #[arg(long, env = "ROUTER_REQUEST_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,

    #[arg(long, env = "ROUTER_REPLICA_COUNT", default_value_t = DEFAULT_REPLICA_COUNT)]
    replica_count: usize,

    #[arg(long, env = "ROUTER_CACHE_SIZE", default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,

    /// JSON document `{table: {key: {column: value}}}` made live at start-up
    #[arg(long, env = "ROUTER_DATA")]
    data: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let local_id = args.local_id.map(NodeId).unwrap_or_default();
    let config = RouterConfig {
        request_timeout: args.request_timeout,
        replica_count: args.replica_count,
        cache_size: args.cache_size,
        ..RouterConfig::new(local_id.clone())
    };
    config.validate()?;

    let http_port = args
        .bind
        .port()
        .checked_add(HTTP_PORT_OFFSET)
        .context("gossip port too high to derive the HTTP port")?;
    let http_addr = SocketAddr::new(args.bind.ip(), http_port);

    tracing::info!("Starting node {} on {}", local_id, args.bind);
    if !args.seeds.is_empty() {
        tracing::info!("Seed nodes: {:?}", args.seeds);
    } else {
        tracing::info!("Starting as seed node (founder)");
    }

    // 1. Local storage:
    let storage = Arc::new(MemoryStorage::new());
    if let Some(path) = &args.data {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let document: serde_json::Value = serde_json::from_str(&raw)?;
        let rows = storage.stage_json(&document)?;
        storage.switch().await;
        tracing::info!("Loaded {} row(s) from {}", rows, path.display());
    }

    // 2. Router worker loop:
    let (router, handle) = RouterService::new(
        config,
        PeerHandle::new(http_addr),
        storage,
        Arc::new(HttpTransport::new()),
        Arc::new(PartitionManager::new()),
    )?;
    router.start();

    // 3. Bind HTTP before gossip announces us, so peers' handshakes find a listener:
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    // 4. Membership (UDP gossip), feeding the router:
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let membership =
        MembershipService::new(local_id, args.bind, http_addr, args.seeds, events_tx).await?;

    let forward = handle.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if forward.notify(event).is_err() {
                tracing::error!("Router stopped, dropping membership events");
                break;
            }
        }
    });

    let service_clone = membership.clone();
    tokio::spawn(async move {
        service_clone.start().await;
    });

    // 5. Spawn stats reporter:
    let stats_handle = handle.clone();
    let stats_membership = membership.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let alive = stats_membership.get_alive_members().len();
            match stats_handle.list_peers().await {
                Ok(peers) => {
                    tracing::info!("Cluster stats: {} alive nodes, {} routable", alive, peers.len());
                    for (id, peer) in peers {
                        tracing::info!("  - {} http={}", id, peer);
                    }
                }
                Err(e) => {
                    tracing::error!("Stats reporter stopping: {}", e);
                    break;
                }
            }
        }
    });

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, handlers::router(handle.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    handle.shutdown();
    Ok(())
}
