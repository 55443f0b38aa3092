//! MCP bridge entrypoint (stdio transport).
//!
//! Serves the memory tools to a desktop MCP client over stdio and forwards each call to the
//! OpenMemory HTTP service. Runs until the client closes stdin or the process is signalled.
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use openmemory_mcp_bridge::{
    bridge::Bridge, config::Config, logging, mcp::OpenMemoryMcpServer,
};
use rmcp::{service::ServiceExt, transport::stdio};

#[derive(Parser)]
#[command(
    name = "openmemory-mcp-bridge",
    version,
    about = "Expose OpenMemory add/get/configure tools to MCP clients over stdio"
)]
struct Cli {
    /// Memory service root URL (overrides OPENMEMORY_URL).
    #[arg(long)]
    base_url: Option<String>,
    /// MCP client name used in the stream address (overrides OPENMEMORY_CLIENT).
    #[arg(long)]
    client: Option<String>,
    /// Memory owner (overrides OPENMEMORY_USER_ID).
    #[arg(long)]
    user_id: Option<String>,
    /// Full stream address `{base}/mcp/{client}/sse/{user}`; replaces the three flags above.
    #[arg(long)]
    sse: Option<String>,
    /// Hold the upstream event stream open and reconnect when it drops.
    #[arg(long)]
    watch_stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    apply_cli(&mut config, cli);

    let session = config.session().context("invalid bridge identity")?;
    let bridge = Arc::new(
        Bridge::start(session, config.settings.clone()).context("failed to start bridge")?,
    );
    tracing::info!(
        stream_url = %bridge.session().stream_url(),
        "Serving memory tools over stdio"
    );
    let server = OpenMemoryMcpServer::new(Arc::clone(&bridge));

    let outcome = serve(server).await;
    bridge.stop().await;
    outcome
}

/// CLI flags win over the environment. `--sse` wins over the identity flags; an identity flag
/// wins over `OPENMEMORY_SSE_URL`.
fn apply_cli(config: &mut Config, cli: Cli) {
    let identity_flag = cli.base_url.is_some() || cli.client.is_some() || cli.user_id.is_some();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(client) = cli.client {
        config.client = client;
    }
    if let Some(user_id) = cli.user_id {
        config.user_id = user_id;
    }
    match cli.sse {
        Some(sse) => {
            if identity_flag {
                tracing::warn!("--sse is set; ignoring --base-url, --client and --user-id");
            }
            config.sse_url = Some(sse);
        }
        None if identity_flag && config.sse_url.take().is_some() => {
            tracing::info!("Identity flags override OPENMEMORY_SSE_URL");
        }
        None => {}
    }
    if cli.watch_stream {
        config.settings.watch_stream = true;
    }
}

async fn serve(server: OpenMemoryMcpServer) -> Result<()> {
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;

    tokio::select! {
        outcome = service.waiting() => {
            outcome.context("MCP server terminated unexpectedly")?;
            tracing::info!("MCP client disconnected");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
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
}
