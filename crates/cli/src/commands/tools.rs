use leadbridge_agent::ToolRegistry;
use leadbridge_mcp::{bootstrap, ConnectPolicy};

use crate::commands::{block_on, CommandResult, ConfigSource};

pub fn run(source: &ConfigSource) -> CommandResult {
    let config = match source.load() {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("tools", "config", error.to_string(), 2),
    };

    match block_on(bootstrap(config, ConnectPolicy::OnDemand)) {
        Ok(Ok(runtime)) => describe(&runtime.registry),
        Ok(Err(error)) => CommandResult::failure("tools", "bootstrap", error.to_string(), 1),
        Err(error) => CommandResult::failure("tools", "runtime", error, 1),
    }
}

/// Pretty JSON list of every registered tool with its input schema.
pub fn describe(registry: &ToolRegistry) -> CommandResult {
    match serde_json::to_string_pretty(&registry.descriptors()) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("tools", "serialization", error.to_string(), 1),
    }
}
