//! CRM operations exposed as tools.
//!
//! Each operation checks its preconditions without I/O first, then borrows a
//! session snapshot from the [`ConnectionManager`] (healing once through a
//! reconnect), performs its remote calls and maps every anticipated failure
//! to an [`OperationError`].

pub mod prompts;

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::completion::{ChatMessage, CompletionClient, CompletionRequest};
use crate::connection::{ConnectionManager, CrmSession, RpcError, Transport};
use crate::domain::{
    FieldMap, LeadId, LeadInput, LeadProfile, LeadSummary, OpportunitySnapshot, StageRecord,
    LEAD_MODEL, STAGE_MODEL,
};
use crate::errors::{OperationError, OperationResult};
use crate::settings::SettingsView;

pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const MAX_LIST_LIMIT: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ids: Vec<LeadId>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionDiagnosis {
    pub status: String,
    pub transport: Option<Transport>,
    pub lead_count: u64,
    pub settings: SettingsView,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub completion_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigureOutcome {
    pub transport: Transport,
    pub status: String,
}

pub struct CrmOperations {
    connection: Arc<ConnectionManager>,
    completion: Arc<dyn CompletionClient>,
    model: String,
}

impl CrmOperations {
    pub fn new(
        connection: Arc<ConnectionManager>,
        completion: Arc<dyn CompletionClient>,
        model: impl Into<String>,
    ) -> Self {
        Self { connection, completion, model: model.into() }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub async fn create_lead(&self, input: LeadInput) -> OperationResult<LeadId> {
        validate_lead(&input)?;
        let session = self.connection.session_or_reconnect().await?;
        create_with(session.as_ref(), &input).await
    }

    /// Creates leads strictly in order and stops at the first failure.
    /// Leads created before the failure are kept.
    pub async fn ingest_prospects(&self, inputs: Vec<LeadInput>) -> OperationResult<IngestReport> {
        if inputs.is_empty() {
            return Err(OperationError::InvalidInput("prospect list must not be empty".to_string()));
        }

        let mut session: Option<Arc<dyn CrmSession>> = None;
        let mut ids = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let position = index + 1;
            if let Err(error) = validate_lead(input) {
                return Err(error.with_context(&prospect_context(position, input)));
            }

            let active = match &session {
                Some(active) => active.clone(),
                None => {
                    let acquired = self
                        .connection
                        .session_or_reconnect()
                        .await
                        .map_err(|error| error.with_context(&prospect_context(position, input)))?;
                    session = Some(acquired.clone());
                    acquired
                }
            };

            match create_with(active.as_ref(), input).await {
                Ok(id) => ids.push(id),
                Err(error) => {
                    warn!(
                        event_name = "crm.ingest.aborted",
                        position,
                        created = ids.len(),
                        error = %error,
                        "prospect ingestion stopped at first failure"
                    );
                    return Err(error.with_context(&prospect_context(position, input)));
                }
            }
        }

        info!(event_name = "crm.ingest.completed", count = ids.len(), "prospects ingested");
        let count = ids.len();
        Ok(IngestReport { ids, count })
    }

    pub async fn qualify_lead(&self, lead_id: LeadId) -> OperationResult<String> {
        let api_key = self.completion_key().await?;
        validate_id(&lead_id)?;

        let lead = self.read_profile(&lead_id).await?;
        self.complete(&api_key, prompts::qualification_prompt(&lead)).await
    }

    /// `tone` defaults to formal. Tones outside the known set are forwarded
    /// to the prompt unchanged.
    pub async fn generate_offer(
        &self,
        lead_id: LeadId,
        tone: Option<&str>,
    ) -> OperationResult<String> {
        let api_key = self.completion_key().await?;
        validate_id(&lead_id)?;

        let tone = tone.map(str::trim).filter(|tone| !tone.is_empty()).unwrap_or(prompts::DEFAULT_TONE);
        if !prompts::is_known_tone(tone) {
            debug!(event_name = "crm.offer.custom_tone", tone, "forwarding unrecognized tone");
        }

        let lead = self.read_profile(&lead_id).await?;
        self.complete(&api_key, prompts::offer_prompt(&lead, tone)).await
    }

    pub async fn summarize_opportunity(&self, lead_id: LeadId) -> OperationResult<String> {
        validate_id(&lead_id)?;
        let session = self.connection.session_or_reconnect().await?;

        let record = read_one(session.as_ref(), &lead_id, &OpportunitySnapshot::FIELDS).await?;
        Ok(OpportunitySnapshot::from_record(&record).render())
    }

    pub async fn list_leads(&self, limit: Option<u32>) -> OperationResult<Vec<LeadSummary>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let session = self.connection.session_or_reconnect().await?;

        let records = session
            .search_read(LEAD_MODEL, json!([]), &LeadSummary::FIELDS, Some(limit))
            .await
            .map_err(remote_failure)?;
        Ok(records.iter().map(LeadSummary::from_record).collect())
    }

    pub async fn list_stages(&self) -> OperationResult<Vec<StageRecord>> {
        let session = self.connection.session_or_reconnect().await?;

        let records = session
            .search_read(STAGE_MODEL, json!([]), &StageRecord::FIELDS, None)
            .await
            .map_err(remote_failure)?;
        Ok(records.iter().map(StageRecord::from_record).collect())
    }

    /// Every field of one lead, as returned by the remote.
    pub async fn get_lead(&self, lead_id: LeadId) -> OperationResult<FieldMap> {
        validate_id(&lead_id)?;
        let session = self.connection.session_or_reconnect().await?;

        read_one(session.as_ref(), &lead_id, &[]).await
    }

    pub async fn connection_status(&self) -> String {
        self.connection.status().await
    }

    /// Connects if needed and proves data access with a lead count.
    pub async fn diagnose_connection(&self) -> OperationResult<ConnectionDiagnosis> {
        let settings = self.connection.settings().await;
        if !settings.is_crm_configured() {
            return Err(OperationError::missing_config(settings.missing_crm_fields()));
        }
        let view = settings.describe();

        let session = match self.connection.active_session().await {
            Some(session) => session,
            None => {
                let _ = self.connection.reconnect().await;
                match self.connection.active_session().await {
                    Some(session) => session,
                    None => {
                        return Err(OperationError::ConnectionUnavailable(format!(
                            "{}; url={}, database={}, username={}",
                            self.connection.status().await,
                            view.url.as_deref().unwrap_or("unset"),
                            view.database.as_deref().unwrap_or("unset"),
                            view.username.as_deref().unwrap_or("unset"),
                        )));
                    }
                }
            }
        };

        let lead_count = session.search_count(LEAD_MODEL, json!([])).await.map_err(|error| {
            OperationError::RemoteError(format!("connected but data access failed: {error}"))
        })?;

        let state = self.connection.state().await;
        Ok(ConnectionDiagnosis {
            status: state.to_string(),
            transport: state.transport(),
            lead_count,
            settings: view,
        })
    }

    /// Replaces the CRM settings and reconnects with them.
    pub async fn configure_connection(
        &self,
        url: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> OperationResult<ConfigureOutcome> {
        let transport = self.connection.configure(url, database, username, password).await??;
        Ok(ConfigureOutcome { transport, status: self.connection.status().await })
    }

    /// Sets or clears the completion API key. A missing or blank key
    /// clears it, as an empty `LEADBRIDGE_LLM_API_KEY` does at startup.
    pub async fn configure_completion(&self, api_key: Option<&str>) -> CompletionOutcome {
        self.connection.update_completion_key(api_key).await;
        let completion_configured = self.connection.settings().await.is_completion_configured();
        info!(
            event_name = "completion.settings.updated",
            configured = completion_configured,
            "completion key replaced"
        );
        CompletionOutcome { completion_configured }
    }

    async fn completion_key(&self) -> OperationResult<SecretString> {
        self.connection.settings().await.completion_api_key().cloned().ok_or_else(|| {
            OperationError::CompletionUnavailable("completion API key is not configured".to_string())
        })
    }

    async fn read_profile(&self, lead_id: &LeadId) -> OperationResult<LeadProfile> {
        let session = self.connection.session_or_reconnect().await?;
        let record = read_one(session.as_ref(), lead_id, &LeadProfile::FIELDS).await?;
        Ok(LeadProfile::from_record(&record))
    }

    async fn complete(&self, api_key: &SecretString, prompt: String) -> OperationResult<String> {
        let request =
            CompletionRequest { model: self.model.clone(), messages: vec![ChatMessage::user(prompt)] };
        self.completion.complete(api_key, request).await.map_err(|error| {
            warn!(event_name = "completion.request.failed", error = %error, "completion request failed");
            OperationError::CompletionUnavailable(error.to_string())
        })
    }
}

fn validate_lead(input: &LeadInput) -> OperationResult<()> {
    if input.has_name() {
        Ok(())
    } else {
        Err(OperationError::InvalidInput("lead name must not be empty".to_string()))
    }
}

fn validate_id(lead_id: &LeadId) -> OperationResult<()> {
    if lead_id.is_positive() {
        Ok(())
    } else {
        Err(OperationError::InvalidInput(format!("lead id must be a positive integer, got {lead_id}")))
    }
}

fn prospect_context(position: usize, input: &LeadInput) -> String {
    let name = input.name.trim();
    if name.is_empty() {
        format!("prospect {position}")
    } else {
        format!("prospect {position} ('{name}')")
    }
}

async fn create_with(session: &dyn CrmSession, input: &LeadInput) -> OperationResult<LeadId> {
    let id = session.create(LEAD_MODEL, input.to_field_map()).await.map_err(remote_failure)?;
    info!(event_name = "crm.lead.created", lead_id = %id, "lead created");
    Ok(id)
}

async fn read_one(
    session: &dyn CrmSession,
    lead_id: &LeadId,
    fields: &[&str],
) -> OperationResult<FieldMap> {
    let records = session
        .read(LEAD_MODEL, std::slice::from_ref(lead_id), fields)
        .await
        .map_err(remote_failure)?;
    records
        .into_iter()
        .next()
        .ok_or_else(|| OperationError::NotFound(format!("no lead with id {lead_id}")))
}

/// Transport-level failures mean the session is unusable; everything else
/// reached the remote and was rejected there.
fn remote_failure(error: RpcError) -> OperationError {
    match error {
        RpcError::Transport(message) => OperationError::ConnectionUnavailable(message),
        other => OperationError::RemoteError(other.to_string()),
    }
}
