#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use proxmox_ssh_mcp::init_tracing;
use proxmox_ssh_mcp::mcp::{Gateway, GatewayConfig, McpProxmoxCommands};
use tracing::info;

const DEFAULT_MCP_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing();

    let config = GatewayConfig::from_env()?;
    let destination = format!("{}@{}:{}", config.username, config.host, config.port);
    let gateway = Gateway::new(config);

    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_MCP_PORT);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    // Every MCP session gets its own tool instance over the shared gateway
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(McpProxmoxCommands::new(gateway.clone()))
            }),
        )
        .with(Tracing);

    info!("Use proxmox_run_host_command to run commands as {}", destination);

    Server::new(TcpListener::bind(mcp_addr))
        .name("Proxmox SSH MCP Server")
        .run(app)
        .await?;

    Ok(())
}
