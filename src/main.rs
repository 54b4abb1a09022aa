#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use dotenv::dotenv;
use poem_mcpserver::McpServer;
use proxmox_ssh_mcp::init_tracing;
use proxmox_ssh_mcp::mcp::{Gateway, GatewayConfig, McpProxmoxCommands};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing();

    let config = GatewayConfig::from_env()?;
    info!(
        "Target {}@{}:{} using key {}",
        config.username,
        config.host,
        config.port,
        config.private_key_path.display()
    );

    let gateway = Gateway::new(config);

    info!("Proxmox SSH MCP server running on stdio");
    poem_mcpserver::stdio::stdio(McpServer::new().tools(McpProxmoxCommands::new(gateway))).await?;
    Ok(())
}
