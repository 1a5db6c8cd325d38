use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use otpgw_server::config::GatewayConfig;

/// OTP delivery gateway HTTP server.
#[derive(Parser, Debug)]
#[command(name = "otpgw-server", about = "Standalone HTTP server for the OTP delivery gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "otpgw.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config: GatewayConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let gateway = otpgw_server::state_factory::build(config).await?;
    let app = otpgw_server::api::router(otpgw_server::api::AppState::new(gateway));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "otpgw-server listening");

    // Graceful shutdown per spec §5: stop accepting new requests, then let
    // axum's own grace period (driven by shutdown_signal) cover in-flight
    // requests and calls; the extra sleep afterwards gives the fire-and-forget
    // webhook/background tasks spawned during that window a last chance to
    // finish before the process exits.
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tokio::time::sleep(shutdown_timeout).await;

    info!("otpgw-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
