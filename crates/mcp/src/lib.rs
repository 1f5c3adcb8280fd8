//! Leadbridge MCP (Model Context Protocol) server.
//!
//! Exposes the CRM tool registry and a few read-only resources to MCP
//! clients over stdio.
//!
//! ```no_run
//! use leadbridge_core::config::{AppConfig, LoadOptions};
//! use leadbridge_mcp::{bootstrap, ConnectPolicy, LeadbridgeMcpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(LoadOptions::default())?;
//!     let runtime = bootstrap(config, ConnectPolicy::Eager).await?;
//!     LeadbridgeMcpServer::new(runtime.registry, runtime.operations).run_stdio().await
//! }
//! ```

pub mod bootstrap;
mod server;

pub use bootstrap::{bootstrap, init_logging, BootstrapError, ConnectPolicy, Runtime};
pub use server::{LeadbridgeMcpServer, LEADS_URI, LEAD_URI_PREFIX, LEAD_URI_TEMPLATE, STAGES_URI};
