//! Tool registry and dispatcher.
//!
//! Every operation is registered once, with a typed input whose JSON Schema
//! is generated from the type. Front-ends list [`ToolRegistry::descriptors`]
//! and call [`ToolRegistry::invoke`]; neither needs to know the operation
//! set. The registry performs no I/O of its own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use leadbridge_core::errors::{ErrorKind, OperationError, OperationResult};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Input: DeserializeOwned + JsonSchema + Send + 'static;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Runs the operation. Known failure modes are returned as
    /// [`OperationError`]s; a panic is caught by the registry.
    async fn execute(&self, input: Self::Input) -> OperationResult<Value>;
}

/// Discovery entry for one registered tool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[async_trait]
trait RegisteredTool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn invoke(&self, arguments: Value) -> OperationResult<Value>;
}

struct Registered<T: Tool> {
    tool: Arc<T>,
}

#[async_trait]
impl<T: Tool> RegisteredTool for Registered<T> {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.tool.name(),
            description: self.tool.description(),
            input_schema: input_schema::<T::Input>(),
        }
    }

    async fn invoke(&self, arguments: Value) -> OperationResult<Value> {
        let input = decode_input::<T::Input>(arguments)?;
        let tool = self.tool.clone();

        match tokio::spawn(async move { tool.execute(input).await }).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                let payload = join_error.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|message| (*message).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "operation panicked".to_string());
                Err(OperationError::Internal(message))
            }
            Err(join_error) => Err(OperationError::Internal(join_error.to_string())),
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn RegisteredTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registers `tool`, replacing any tool with the same name.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool,
    {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Box::new(Registered { tool: Arc::new(tool) }));
    }

    /// Registered tools in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor())
            .collect()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> OperationResult<Value> {
        let Some(tool) = self.tools.get(name) else {
            warn!(event_name = "tool.invoke.unknown", tool = name, "unknown tool requested");
            return Err(OperationError::UnknownOperation(name.to_string()));
        };

        info!(event_name = "tool.invoke", tool = name, "invoking tool");
        let result = tool.invoke(arguments).await;
        if let Err(error) = &result {
            warn!(
                event_name = "tool.invoke.failed",
                tool = name,
                kind = error.kind().as_str(),
                error = %error,
                "tool invocation failed"
            );
        }
        result
    }
}

/// JSON Schema object for a tool input type.
pub fn input_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(&schema) {
        Ok(Value::Object(mut object)) => {
            object.remove("$schema");
            Value::Object(object)
        }
        _ => Value::Object(Map::new()),
    }
}

/// Decodes raw arguments into a tool input. `null` counts as an empty
/// object; shape mismatches name the offending top-level field when one can
/// be singled out.
pub fn decode_input<T: DeserializeOwned>(arguments: Value) -> OperationResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    match serde_json::from_value::<T>(arguments.clone()) {
        Ok(input) => Ok(input),
        Err(error) => {
            let message = error.to_string();
            let field = locate_field::<T>(&arguments).or_else(|| quoted_field(&message));
            Err(OperationError::ValidationError { field, message })
        }
    }
}

/// serde names the field itself for missing and unknown fields, at any
/// depth. Only used when no top-level key can be singled out.
fn quoted_field(message: &str) -> Option<String> {
    let rest = message
        .strip_prefix("missing field `")
        .or_else(|| message.strip_prefix("unknown field `"))?;
    rest.split_once('`').map(|(field, _)| field.to_string())
}

/// A key is the culprit when decoding succeeds without it, or only fails
/// because it is now missing.
fn locate_field<T: DeserializeOwned>(arguments: &Value) -> Option<String> {
    let Value::Object(object) = arguments else {
        return None;
    };

    object.keys().find_map(|key| {
        let mut without = object.clone();
        without.remove(key);
        match serde_json::from_value::<T>(Value::Object(without)) {
            Ok(_) => Some(key.clone()),
            Err(error) if error.to_string() == format!("missing field `{key}`") => Some(key.clone()),
            Err(_) => None,
        }
    })
}

/// Serializes an operation payload.
pub fn to_payload<T: Serialize>(value: &T) -> OperationResult<Value> {
    serde_json::to_value(value).map_err(|error| OperationError::Internal(error.to_string()))
}

/// Caller-facing result shape shared by every front-end:
/// `{"success":true,"payload":...}` or
/// `{"success":false,"error":{"kind":...,"message":...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Envelope {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| String::from("{}"))
    }
}

impl From<OperationResult<Value>> for Envelope {
    fn from(result: OperationResult<Value>) -> Self {
        match result {
            Ok(payload) => Self { success: true, payload: Some(payload), error: None },
            Err(error) => {
                let field = match &error {
                    OperationError::ValidationError { field, .. } => field.clone(),
                    _ => None,
                };
                Self {
                    success: false,
                    payload: None,
                    error: Some(EnvelopeError { kind: error.kind(), message: error.to_string(), field }),
                }
            }
        }
    }
}
