use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use hostwatch::config::Settings;
use hostwatch::logging::init_logging;
use hostwatch::poller::PollLoop;
use hostwatch::server;
use hostwatch::supervisor::Supervisor;
use hostwatch::AppContext;

#[derive(Parser, Debug)]
#[command(name = "hostwatch")]
#[command(about = "Host health dashboard backend: polls Prometheus, caches snapshots, streams them over WebSocket")]
struct Args {
    /// Path to the TOML config file (optional; environment variables also apply)
    #[arg(short, long, default_value = "hostwatch.toml")]
    config: PathBuf,

    /// Listen address, overriding server.listen (e.g., "127.0.0.1:8000")
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }

    let supervisor = Supervisor::new(&settings.supervisor);
    let ctx = AppContext::from_settings(settings, supervisor.stop_signal())
        .context("Failed to build the Prometheus client")?;

    start_poll_loops(&supervisor, &ctx);

    let listen = ctx.settings.server.listen;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    server::serve(listener, ctx.clone(), shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let aborted = supervisor.shutdown().await;
    if aborted > 0 {
        warn!("Aborted {} background tasks", aborted);
    }
    if !ctx
        .subscribers
        .wait_idle(ctx.settings.supervisor.shutdown_grace)
        .await
    {
        warn!(
            "{} subscribers still connected after the grace period",
            ctx.subscribers.len()
        );
    }

    info!("Shutdown complete");
    Ok(())
}

/// Start the status and resource usage loops under the supervisor.
fn start_poll_loops(supervisor: &Supervisor, ctx: &AppContext) {
    let intervals = &ctx.settings.intervals;
    let loops = [
        PollLoop::host_status(intervals.host_status),
        PollLoop::resource_usage(intervals.other_metrics),
    ];

    for poll in loops {
        let ctx = ctx.clone();
        supervisor.supervise(poll.name().to_string(), move |stop| {
            poll.clone().run(
                ctx.fetcher.clone(),
                ctx.cache.clone(),
                ctx.settings.cache.ttl,
                stop,
            )
        });
    }
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
