pub mod catalog;
pub mod llm;
pub mod tools;

pub use catalog::{crm_registry, register_crm_tools, CRM_TOOL_NAMES};
pub use llm::OpenAiClient;
pub use tools::{Envelope, EnvelopeError, Tool, ToolDescriptor, ToolRegistry};
