use leadbridge_agent::{Envelope, ToolRegistry};
use leadbridge_core::errors::OperationError;
use leadbridge_mcp::{bootstrap, ConnectPolicy};
use serde_json::Value;

use crate::commands::{block_on, CommandResult, ConfigSource};

pub fn run(source: &ConfigSource, tool: &str, raw_arguments: &str) -> CommandResult {
    let config = match source.load() {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("invoke", "config", error.to_string(), 2),
    };

    let outcome = block_on(async {
        let runtime = bootstrap(config, ConnectPolicy::OnDemand).await?;
        Ok::<_, leadbridge_mcp::BootstrapError>(dispatch(&runtime.registry, tool, raw_arguments).await)
    });

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(error)) => CommandResult::failure("invoke", "bootstrap", error.to_string(), 1),
        Err(error) => CommandResult::failure("invoke", "runtime", error, 1),
    }
}

/// Calls one tool and renders its envelope. Exit code 1 when the envelope
/// reports a failure.
pub async fn dispatch(registry: &ToolRegistry, tool: &str, raw_arguments: &str) -> CommandResult {
    let envelope = match parse_arguments(raw_arguments) {
        Ok(arguments) => Envelope::from(registry.invoke(tool, arguments).await),
        Err(error) => Envelope::from(Err::<Value, _>(error)),
    };

    let exit_code = if envelope.success { 0 } else { 1 };
    CommandResult { exit_code, output: envelope.to_pretty_json() }
}

fn parse_arguments(raw: &str) -> Result<Value, OperationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_str(trimmed).map_err(|error| OperationError::ValidationError {
        field: None,
        message: format!("arguments are not valid JSON: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_arguments;

    #[test]
    fn blank_arguments_mean_an_empty_object() {
        assert_eq!(parse_arguments("  ").expect("empty object"), json!({}));
    }

    #[test]
    fn malformed_arguments_are_a_validation_error() {
        let error = parse_arguments("{lead_id:").expect_err("invalid JSON");
        assert!(error.to_string().contains("not valid JSON"));
    }
}
