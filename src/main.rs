use anyhow::{Error, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use greetd::{config, inflight, server, shutdown};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// path to the config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    // load config from path
    let config = config::Config::load(args.config)?;

    // init tracing
    let _ = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let tracker = inflight::InflightTracker::new();
    let cancel = shutdown::ShutdownSignal::new();
    let drain = shutdown::Drain::new(
        cancel.clone(),
        tracker.clone(),
        config.grace_period(),
        config.close_timeout(),
    );

    let deps = server::Dependencies::new(tracker, cancel, drain.state());
    let server = server::Server::new(config.server.addr.clone(), deps);

    // start server
    let listener = server.bind().await?;
    let server_handle = {
        let server = server.clone();
        tokio::spawn(async move {
            server.serve(listener).await;
        })
    };

    wait_for_shutdown_signal().await;

    info!("start graceful shutdown");
    drain.run(&server).await?;

    let _ = server_handle.await;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            debug!("received Ctrl+C signal");
        },
        _ = terminate => {
            debug!("received SIGTERM signal");
        },
    }
}
