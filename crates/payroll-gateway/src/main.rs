use clap::Parser;
use payroll_core::config::PayrollConfig;
use payroll_events::EventHub;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod app;
mod auth;
mod http;

/// Real-time payroll event gateway for the admin dashboard.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.payroll/payroll.toml).
    #[arg(long, env = "PAYROLL_CONFIG")]
    config: Option<String>,
    /// Override `gateway.port`.
    #[arg(long)]
    port: Option<u16>,
    /// Override `gateway.bind`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "payroll_gateway=info,payroll_events=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    let mut config = PayrollConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PayrollConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;

    let hub = EventHub::start(config.events.clone());

    let state = Arc::new(app::AppState::new(config, Arc::clone(&hub)));
    let router = app::build_router(state);

    info!("Payroll event gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&hub)))
        .await?;

    info!("gateway stopped");
    Ok(())
}

/// Resolve on Ctrl-C, closing every open stream first so the server can drain.
async fn shutdown_signal(hub: Arc<EventHub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    hub.shutdown().await;
}
