//! MCP front-end over the tool registry.
//!
//! Tools are listed from [`ToolRegistry::descriptors`] and every call goes
//! through [`ToolRegistry::invoke`]; results are returned as the JSON
//! envelope in a single text content block. Failures, unknown tool names
//! included, travel inside the envelope with `is_error` set rather than as
//! protocol errors.

use std::sync::Arc;

use leadbridge_agent::{Envelope, ToolRegistry};
use leadbridge_core::domain::LeadId;
use leadbridge_core::errors::{OperationError, OperationResult};
use leadbridge_core::operations::CrmOperations;
use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, Implementation,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
    RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents,
    ResourceTemplate, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

pub const LEADS_URI: &str = "crm://leads";
pub const STAGES_URI: &str = "crm://stages";
pub const LEAD_URI_PREFIX: &str = "crm://lead/";
pub const LEAD_URI_TEMPLATE: &str = "crm://lead/{id}";

const RESOURCE_LEAD_LIMIT: u32 = 50;

const INSTRUCTIONS: &str = "CRM tools backed by Odoo. Use connection_status or \
diagnose_connection first when calls report connection problems; configure_connection \
replaces the CRM settings at runtime. Every tool returns a JSON envelope \
{\"success\": bool, \"payload\" | \"error\"}.";

#[derive(Clone)]
pub struct LeadbridgeMcpServer {
    registry: Arc<ToolRegistry>,
    operations: Arc<CrmOperations>,
}

impl LeadbridgeMcpServer {
    pub fn new(registry: Arc<ToolRegistry>, operations: Arc<CrmOperations>) -> Self {
        Self { registry, operations }
    }

    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "mcp.server.starting", transport = "stdio", "starting MCP server");
        let service = self.serve(rmcp::transport::stdio()).await?;
        let quit_reason = service.waiting().await?;
        info!(event_name = "mcp.server.stopped", reason = ?quit_reason, "MCP server stopped");
        Ok(())
    }

    /// Tool listing in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.registry
            .descriptors()
            .into_iter()
            .map(|descriptor| {
                let schema = match descriptor.input_schema {
                    Value::Object(object) => object,
                    _ => Map::new(),
                };
                Tool::new(descriptor.name, descriptor.description, Arc::new(schema))
            })
            .collect()
    }

    pub async fn call(&self, name: &str, arguments: Option<Map<String, Value>>) -> CallToolResult {
        let arguments = arguments.map(Value::Object).unwrap_or(Value::Null);
        let envelope = Envelope::from(self.registry.invoke(name, arguments).await);
        let content = vec![Content::text(envelope.to_pretty_json())];

        if envelope.success {
            CallToolResult::success(content)
        } else {
            CallToolResult::error(content)
        }
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            resource(LEADS_URI, "leads", "Most recent CRM leads"),
            resource(STAGES_URI, "stages", "CRM pipeline stages"),
        ]
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        let template = json!({
            "uriTemplate": LEAD_URI_TEMPLATE,
            "name": "lead",
            "description": "Every field of one CRM lead",
            "mimeType": "application/json",
        });
        serde_json::from_value(template).map(|template| vec![template]).unwrap_or_default()
    }

    /// Reads a resource. Operation failures are rendered as the error
    /// envelope; only unknown URIs are protocol errors.
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        debug!(event_name = "mcp.resource.read", uri, "reading resource");
        let result: OperationResult<Value> = if uri == LEADS_URI {
            self.operations.list_leads(Some(RESOURCE_LEAD_LIMIT)).await.and_then(to_value)
        } else if uri == STAGES_URI {
            self.operations.list_stages().await.and_then(to_value)
        } else if let Some(raw_id) = uri.strip_prefix(LEAD_URI_PREFIX) {
            match raw_id.parse::<i64>() {
                Ok(id) => self.operations.get_lead(LeadId::from(id)).await.map(Value::Object),
                Err(_) => Err(OperationError::InvalidInput(format!(
                    "lead id must be an integer, got `{raw_id}`"
                ))),
            }
        } else {
            return Err(ErrorData::resource_not_found(
                format!("unknown resource `{uri}`"),
                Some(json!({ "uri": uri })),
            ));
        };

        let text = match result {
            Ok(payload) => serde_json::to_string_pretty(&payload).unwrap_or_default(),
            Err(error) => Envelope::from(Err(error)).to_pretty_json(),
        };
        Ok(ReadResourceResult { contents: vec![ResourceContents::text(text, uri)] })
    }
}

fn resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name);
    raw.description = Some(description.to_string());
    raw.mime_type = Some("application/json".to_string());
    raw.no_annotation()
}

fn to_value<T: serde::Serialize>(value: T) -> OperationResult<Value> {
    serde_json::to_value(value).map_err(|error| OperationError::Internal(error.to_string()))
}

fn implementation() -> Implementation {
    serde_json::from_value(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
    .unwrap_or_default()
}

impl ServerHandler for LeadbridgeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            server_info: implementation(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(self.call(&request.name, request.arguments).await)
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult::with_all_items(self.resources()))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult::with_all_items(self.resource_templates()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read(&request.uri).await
    }
}
