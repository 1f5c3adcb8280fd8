//! Leadbridge MCP server binary.
//!
//! ```bash
//! # Odoo settings may also come from leadbridge.toml
//! ODOO_URL=https://acme.odoo.com ODOO_DB=acme ODOO_LOGIN=bot@acme.com \
//!   ODOO_PASSWORD=... OPENAI_API_KEY=... leadbridge-mcp
//! ```

use anyhow::Result;
use leadbridge_core::config::{AppConfig, LoadOptions};
use leadbridge_mcp::{bootstrap, init_logging, ConnectPolicy, LeadbridgeMcpServer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    tracing::info!(event_name = "system.mcp.starting", "starting leadbridge-mcp");
    let runtime = bootstrap(config, ConnectPolicy::Eager).await?;

    LeadbridgeMcpServer::new(runtime.registry, runtime.operations).run_stdio().await
}
