//! The CRM tool set. Each tool binds a typed input to one
//! [`CrmOperations`] method.

use std::sync::Arc;

use async_trait::async_trait;
use leadbridge_core::domain::{LeadId, LeadInput};
use leadbridge_core::errors::OperationResult;
use leadbridge_core::operations::CrmOperations;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{to_payload, Tool, ToolRegistry};

pub const CRM_TOOL_NAMES: [&str; 10] = [
    "create_lead",
    "ingest_prospects",
    "qualify_lead",
    "generate_offer",
    "summarize_opportunity",
    "list_leads",
    "connection_status",
    "diagnose_connection",
    "configure_connection",
    "configure_completion",
];

/// Registry holding every CRM tool, in discovery order.
pub fn crm_registry(ops: Arc<CrmOperations>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    register_crm_tools(&mut registry, ops);
    registry
}

pub fn register_crm_tools(registry: &mut ToolRegistry, ops: Arc<CrmOperations>) {
    registry.register(CreateLead { ops: ops.clone() });
    registry.register(IngestProspects { ops: ops.clone() });
    registry.register(QualifyLead { ops: ops.clone() });
    registry.register(GenerateOffer { ops: ops.clone() });
    registry.register(SummarizeOpportunity { ops: ops.clone() });
    registry.register(ListLeads { ops: ops.clone() });
    registry.register(ConnectionStatus { ops: ops.clone() });
    registry.register(DiagnoseConnection { ops: ops.clone() });
    registry.register(ConfigureConnection { ops: ops.clone() });
    registry.register(ConfigureCompletion { ops });
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IngestProspectsInput {
    /// Leads to create, in order. Processing stops at the first failure.
    pub prospects: Vec<LeadInput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LeadIdInput {
    /// Identifier of the lead in the CRM.
    #[schemars(with = "i64")]
    pub lead_id: LeadId,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerateOfferInput {
    /// Identifier of the lead in the CRM.
    #[schemars(with = "i64")]
    pub lead_id: LeadId,
    /// Writing tone: formal (default), sales or technical.
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListLeadsInput {
    /// Maximum number of leads to return (1-100, default 10).
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoInput {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfigureConnectionInput {
    /// CRM address, with or without scheme.
    pub url: String,
    /// Database name.
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfigureCompletionInput {
    /// API key of the completion service. Omit or leave blank to clear it.
    #[serde(default)]
    pub api_key: Option<String>,
}

struct CreateLead {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for CreateLead {
    type Input = LeadInput;

    fn name(&self) -> &'static str {
        "create_lead"
    }

    fn description(&self) -> &'static str {
        "Create a lead in the CRM. Only the fields provided are sent."
    }

    async fn execute(&self, input: LeadInput) -> OperationResult<Value> {
        let id = self.ops.create_lead(input).await?;
        Ok(json!({ "lead_id": id }))
    }
}

struct IngestProspects {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for IngestProspects {
    type Input = IngestProspectsInput;

    fn name(&self) -> &'static str {
        "ingest_prospects"
    }

    fn description(&self) -> &'static str {
        "Create several leads in order. Stops at the first failing prospect; \
         leads created before it are kept."
    }

    async fn execute(&self, input: IngestProspectsInput) -> OperationResult<Value> {
        to_payload(&self.ops.ingest_prospects(input.prospects).await?)
    }
}

struct QualifyLead {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for QualifyLead {
    type Input = LeadIdInput;

    fn name(&self) -> &'static str {
        "qualify_lead"
    }

    fn description(&self) -> &'static str {
        "AI qualification of a lead: short summary and interest score (0-100)."
    }

    async fn execute(&self, input: LeadIdInput) -> OperationResult<Value> {
        Ok(Value::String(self.ops.qualify_lead(input.lead_id).await?))
    }
}

struct GenerateOffer {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for GenerateOffer {
    type Input = GenerateOfferInput;

    fn name(&self) -> &'static str {
        "generate_offer"
    }

    fn description(&self) -> &'static str {
        "Draft a commercial proposal email for a lead in the requested tone."
    }

    async fn execute(&self, input: GenerateOfferInput) -> OperationResult<Value> {
        let text = self.ops.generate_offer(input.lead_id, input.tone.as_deref()).await?;
        Ok(Value::String(text))
    }
}

struct SummarizeOpportunity {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for SummarizeOpportunity {
    type Input = LeadIdInput;

    fn name(&self) -> &'static str {
        "summarize_opportunity"
    }

    fn description(&self) -> &'static str {
        "Plain-text status of an opportunity: name, stage, probability, expected revenue."
    }

    async fn execute(&self, input: LeadIdInput) -> OperationResult<Value> {
        Ok(Value::String(self.ops.summarize_opportunity(input.lead_id).await?))
    }
}

struct ListLeads {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for ListLeads {
    type Input = ListLeadsInput;

    fn name(&self) -> &'static str {
        "list_leads"
    }

    fn description(&self) -> &'static str {
        "List leads with contact, stage and probability."
    }

    async fn execute(&self, input: ListLeadsInput) -> OperationResult<Value> {
        let leads = self.ops.list_leads(input.limit).await?;
        Ok(json!({ "count": leads.len(), "leads": to_payload(&leads)? }))
    }
}

struct ConnectionStatus {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for ConnectionStatus {
    type Input = NoInput;

    fn name(&self) -> &'static str {
        "connection_status"
    }

    fn description(&self) -> &'static str {
        "Current CRM connection status. Never contacts the CRM."
    }

    async fn execute(&self, _input: NoInput) -> OperationResult<Value> {
        Ok(json!({ "status": self.ops.connection_status().await }))
    }
}

struct DiagnoseConnection {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for DiagnoseConnection {
    type Input = NoInput;

    fn name(&self) -> &'static str {
        "diagnose_connection"
    }

    fn description(&self) -> &'static str {
        "Connect if needed and verify data access by counting leads."
    }

    async fn execute(&self, _input: NoInput) -> OperationResult<Value> {
        to_payload(&self.ops.diagnose_connection().await?)
    }
}

struct ConfigureConnection {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for ConfigureConnection {
    type Input = ConfigureConnectionInput;

    fn name(&self) -> &'static str {
        "configure_connection"
    }

    fn description(&self) -> &'static str {
        "Replace the CRM connection settings and reconnect."
    }

    async fn execute(&self, input: ConfigureConnectionInput) -> OperationResult<Value> {
        let outcome = self
            .ops
            .configure_connection(&input.url, &input.database, &input.username, &input.password)
            .await?;
        to_payload(&outcome)
    }
}

struct ConfigureCompletion {
    ops: Arc<CrmOperations>,
}

#[async_trait]
impl Tool for ConfigureCompletion {
    type Input = ConfigureCompletionInput;

    fn name(&self) -> &'static str {
        "configure_completion"
    }

    fn description(&self) -> &'static str {
        "Set or clear the completion API key used by qualify_lead and generate_offer."
    }

    async fn execute(&self, input: ConfigureCompletionInput) -> OperationResult<Value> {
        to_payload(&self.ops.configure_completion(input.api_key.as_deref()).await)
    }
}
