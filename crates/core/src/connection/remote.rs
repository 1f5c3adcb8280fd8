//! Boundary to the remote CRM. Implementations live outside this crate
//! (`leadbridge-crm` for Odoo JSON-RPC, in-process stubs in tests).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::connection::transport::Endpoint;
use crate::domain::{FieldMap, LeadId};
use crate::settings::CrmCredentials;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authentication rejected: {0}")]
    Authentication(String),
    #[error("{0}")]
    Remote(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Authenticated handle to the remote CRM. Every remote call goes through
/// one of these.
#[async_trait]
pub trait CrmSession: Send + Sync {
    async fn create(&self, model: &str, fields: FieldMap) -> Result<LeadId, RpcError>;

    /// Reads `fields` of the given records; an empty `fields` slice reads
    /// every field. Unknown ids are silently absent from the result.
    async fn read(
        &self,
        model: &str,
        ids: &[LeadId],
        fields: &[&str],
    ) -> Result<Vec<FieldMap>, RpcError>;

    async fn search_count(&self, model: &str, domain: Value) -> Result<u64, RpcError>;

    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<FieldMap>, RpcError>;
}

#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Authenticates against one endpoint. No retries.
    async fn login(
        &self,
        endpoint: &Endpoint,
        credentials: &CrmCredentials,
    ) -> Result<Arc<dyn CrmSession>, RpcError>;
}
