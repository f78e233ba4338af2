use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use chat_server::config::{FileConfig, load_config};
use chat_server::{Hub, Listener, ServerConfig};

#[derive(Parser)]
#[command(name = "chat-server")]
#[command(about = "Line-oriented TCP broadcast chat server")]
struct Args {
    /// Config file (defaults to ./chat_server.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "chat_server=debug,info"
    } else {
        "chat_server=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        file_config.server.port = port;
    }
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    let config = ServerConfig::from_file(&file_config)?;

    info!(
        "Session config: mailbox={} lines, max_line={}B, idle_timeout={:?}, echo={}",
        config.session.mailbox_capacity,
        config.session.max_line_bytes,
        config.session.idle_timeout,
        config.session.echo_to_sender
    );

    let hub = Hub::new(config.session.clone());
    let listener = Listener::bind(config.bind_addr, hub.clone())
        .await
        .context("Failed to start chat server")?;
    info!("Chat server started on {}", listener.local_addr()?);

    let accept_loop = tokio::spawn(listener.run());

    shutdown_signal().await;
    info!("Shutting down...");

    if !hub.shutdown(config.shutdown_grace).await {
        warn!("Forced shutdown with sessions still open");
    }
    if let Err(e) = accept_loop.await {
        warn!(error = %e, "accept loop task failed");
    }

    let snapshot = hub.metrics().snapshot();
    info!(metrics = %serde_json::to_string(&snapshot)?, "Final metrics");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
