//! web-app service entry point.
//!
//! ```text
//!   conf/config.toml ──▶ ConfigStore ◀── watcher / SIGHUP (hot reload)
//!                           │
//!            ┌──────────────┼──────────────────┐
//!            ▼              ▼                  ▼
//!     StructuredLogger    Pools          HttpServer
//!     (JSON, rolling)   (mysql, redis)   observer → recovery → routes
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use web_app::config::ConfigStore;
use web_app::http::HttpServer;
use web_app::lifecycle::shutdown::run_then;
use web_app::lifecycle::{signals, startup, Services, Shutdown};
use web_app::observability::{metrics, StructuredLogger};

#[derive(Debug, Parser)]
#[command(name = "web-app", version, about = "HTTP service with hot-reloaded configuration")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "APP_CONFIG", default_value = "./conf/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let Services {
        store,
        logger,
        pools,
    } = startup::bootstrap(&cli.config).await?;

    let shutdown = Shutdown::new();
    // subscribed before any signal can fire
    let server_shutdown = shutdown.subscribe();
    signals::spawn_terminate_listener(shutdown.clone());

    let served = run_then(serve(&store, logger, &shutdown, server_shutdown), async {
        shutdown.trigger();
        pools.close().await;
    })
    .await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Everything between a successful bootstrap and shutdown.
async fn serve(
    store: &Arc<ConfigStore>,
    logger: &'static StructuredLogger,
    shutdown: &Shutdown,
    server_shutdown: broadcast::Receiver<()>,
) -> Result<(), Box<dyn Error>> {
    let config = store.current();

    if let Some(address) = &config.metrics_address {
        let addr: SocketAddr = address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let watch = store.watch(shutdown.subscribe(), move |snapshot| {
        startup::apply_reloaded(logger, snapshot);
    })?;
    signals::spawn_reload_listener(watch.triggers(), shutdown);

    let served = match TcpListener::bind(config.bind_address()).await {
        Ok(listener) => {
            let server = HttpServer::new(Arc::clone(store));
            server.run(listener, server_shutdown).await
        }
        Err(e) => Err(e),
    };

    shutdown.trigger();
    watch.stop().await;
    Ok(served?)
}
