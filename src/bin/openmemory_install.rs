use anyhow::{Context, Result};
use clap::Parser;
use openmemory_mcp_bridge::{
    config::{DEFAULT_BASE_URL, DEFAULT_CLIENT, DEFAULT_USER_ID},
    install, logging,
    session::BridgeSession,
};

#[derive(Parser)]
#[command(
    name = "openmemory-install",
    about = "Register the OpenMemory MCP bridge with Claude Desktop"
)]
struct Cli {
    /// Memory service root URL.
    #[arg(default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// MCP client name used in the stream address.
    #[arg(default_value = DEFAULT_CLIENT)]
    client: String,
    /// Memory owner.
    #[arg(default_value = DEFAULT_USER_ID)]
    user_id: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    let session = BridgeSession::new(&cli.base_url, &cli.client, &cli.user_id)
        .context("invalid bridge identity")?;
    println!("Installing OpenMemory MCP bridge");
    println!("  Memory service: {}", session.base_url());
    println!("  Client:         {}", session.client());
    println!("  User:           {}", session.user_id());

    let command = install::locate_bridge_binary().with_context(|| {
        format!(
            "build the bridge first (cargo build --release) or set {}",
            install::BRIDGE_BIN_ENV
        )
    })?;
    let config_path = install::claude_desktop_config_path()?;
    let report = install::install(&session, &command, &config_path)
        .with_context(|| format!("failed to update {}", config_path.display()))?;

    if report.replaced_invalid {
        println!("Existing config was not valid JSON and has been replaced.");
    }
    println!("Updated {}", report.config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Make sure OpenMemory is running at {}", session.base_url());
    println!("  2. Restart Claude Desktop");
    println!("  3. Ask Claude to remember something");
    println!();
    println!("For other MCP clients, register:");
    println!("  Command: {}", report.command.display());
    println!("  Args:    {}", report.args.join(" "));
    Ok(())
}
