//! POEMA Brain - The Installation's Engines
//!
//! Runs the five kernels on their timers, grows the archive from seed text
//! and serves snapshots, commands and the relay over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn, Level};
use warp::Filter;

use poema_brain::handlers;
use poema_brain::scheduler::SharedScheduler;
use poema_brain::{Installation, TokioScheduler};
use poema_core::{Clock, PoemaConfig, SystemClock};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    // Initialize logging
    let level = std::env::var("POEMA_LOG")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = PoemaConfig::from_env();
    if let Err(e) = config.validate() {
        error!("❌ Invalid configuration: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║                                                           ║");
    println!("║    POEMA                                                  ║");
    println!("║    Periodic kernels, associative archive                  ║");
    println!("║    Brain v{:<48}║", VERSION);
    println!("║                                                           ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();

    info!(
        "⚙️ Tick {}ms (+{}ms jitter), decay {}ms, seed {:?}, offline={}",
        config.engine.tick_interval_ms,
        config.engine.tick_jitter_ms,
        config.index.decay_interval_ms,
        config.engine.rng_seed,
        config.content.offline
    );

    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let installation = match Installation::new(config.clone(), scheduler, clock) {
        Ok(installation) => Arc::new(installation),
        Err(e) => {
            error!("❌ Cannot build installation: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = installation.seed() {
        warn!("⚠️ Seeding stopped early: {}", e);
    }
    if let Err(e) = installation.start() {
        error!("❌ Cannot start kernels: {}", e);
        std::process::exit(1);
    }

    // Grow the archive in the background
    let ingest = installation.clone();
    let fetch_every = Duration::from_millis(config.content.fetch_interval_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(fetch_every);
        loop {
            interval.tick().await;
            if let Err(e) = ingest.ingest().await {
                warn!("⚠️ Ingestion failed: {}", e);
            }
        }
    });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type");
    let routes = handlers::routes(installation.clone()).with(cors);

    let addr: SocketAddr = match format!("{}:{}", config.network.bind_address, config.network.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("❌ Bad bind address: {}", e);
            std::process::exit(1);
        }
    };

    info!("🌐 Listening on http://{}", addr);
    let (_, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Cannot listen for shutdown signal: {}", e);
        }
    });
    server.await;

    let cancelled = installation.stop();
    info!("👋 Shutdown: {} jobs cancelled", cancelled);
}
