//! Process wiring shared by the MCP server and the operator CLI.

use std::sync::Arc;
use std::time::Duration;

use leadbridge_agent::{crm_registry, OpenAiClient, ToolRegistry};
use leadbridge_core::completion::CompletionError;
use leadbridge_core::config::{AppConfig, LogFormat};
use leadbridge_core::connection::{ConnectionManager, RpcError, TransportPorts};
use leadbridge_core::operations::CrmOperations;
use leadbridge_core::settings::Settings;
use leadbridge_crm::OdooConnector;
use thiserror::Error;
use tracing::{info, Level};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not build CRM connector: {0}")]
    Connector(#[from] RpcError),
    #[error("could not build completion client: {0}")]
    Completion(#[from] CompletionError),
}

/// Whether to attempt the CRM connection before serving requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectPolicy {
    Eager,
    OnDemand,
}

pub struct Runtime {
    pub config: AppConfig,
    pub connection: Arc<ConnectionManager>,
    pub operations: Arc<CrmOperations>,
    pub registry: Arc<ToolRegistry>,
}

pub async fn bootstrap(config: AppConfig, policy: ConnectPolicy) -> Result<Runtime, BootstrapError> {
    let connector = Arc::new(OdooConnector::new(Duration::from_secs(config.transport.timeout_secs))?);
    let completion = Arc::new(OpenAiClient::new(
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )?);

    let settings = Settings::from_config(&config);
    let ports = TransportPorts::from(&config.transport);
    let connection = Arc::new(match policy {
        ConnectPolicy::Eager => ConnectionManager::start(settings, connector, ports).await,
        ConnectPolicy::OnDemand => ConnectionManager::new(settings, connector, ports),
    });

    let operations =
        Arc::new(CrmOperations::new(connection.clone(), completion, config.llm.model.clone()));
    let registry = Arc::new(crm_registry(operations.clone()));

    info!(
        event_name = "system.bootstrap.ready",
        tools = registry.descriptors().len(),
        status = %connection.status().await,
        "runtime assembled"
    );
    Ok(Runtime { config, connection, operations, registry })
}

/// Logs go to stderr: stdout carries protocol frames or command output.
pub fn init_logging(config: &AppConfig) {
    let level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
