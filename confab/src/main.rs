mod server;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use confab_signal::{config::load_config, logging, Coordinator, LoopbackEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration (fail fast on misconfigurations)
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("confab server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Media engine. The loopback engine negotiates in-process and
    //    forwards no media; a real deployment plugs an SFU worker in here.
    let engine = Arc::new(LoopbackEngine::new(config.engine.clone()));

    // 4. Coordinator plus its maintenance tasks (staleness sweep, stats
    //    refresh, engine event pump)
    let coordinator = Coordinator::new(config.signaling.clone(), engine);
    let _maintenance = coordinator.spawn_maintenance();
    info!(
        peer_stale_ms = config.signaling.peer_stale_ms,
        sweep_interval_ms = config.signaling.sweep_interval_ms,
        stats_interval_ms = config.signaling.stats_interval_ms,
        "coordinator initialized"
    );

    // 5. Serve HTTP until Ctrl+C or a fatal engine failure
    server::run(&config, coordinator).await
}
