use async_trait::async_trait;
use leadbridge_core::connection::{CrmSession, RpcError};
use leadbridge_core::domain::{FieldMap, LeadId};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

use crate::rpc::JsonRpcClient;

/// Authenticated Odoo session: a uid plus the credentials every
/// `object.execute_kw` call repeats.
pub struct OdooSession {
    rpc: JsonRpcClient,
    database: String,
    uid: i64,
    password: SecretString,
}

impl OdooSession {
    pub(crate) fn new(rpc: JsonRpcClient, database: String, uid: i64, password: SecretString) -> Self {
        Self { rpc, database, uid, password }
    }

    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        self.rpc
            .call(
                "object",
                "execute_kw",
                vec![
                    Value::String(self.database.clone()),
                    Value::from(self.uid),
                    Value::String(self.password.expose_secret().to_string()),
                    Value::String(model.to_string()),
                    Value::String(method.to_string()),
                    Value::Array(args),
                    Value::Object(kwargs),
                ],
            )
            .await
    }
}

fn field_list(fields: &[&str]) -> Value {
    Value::Array(fields.iter().map(|field| Value::String((*field).to_string())).collect())
}

fn records(value: Value) -> Result<Vec<FieldMap>, RpcError> {
    let Value::Array(items) = value else {
        return Err(RpcError::Decode(format!("expected a list of records, got {value}")));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(RpcError::Decode(format!("expected a record object, got {other}"))),
        })
        .collect()
}

#[async_trait]
impl CrmSession for OdooSession {
    async fn create(&self, model: &str, fields: FieldMap) -> Result<LeadId, RpcError> {
        let result = self.execute_kw(model, "create", vec![Value::Object(fields)], Map::new()).await?;
        match result {
            Value::Number(id) => Ok(LeadId(id)),
            // Newer servers answer batch-style creates with a list of ids.
            Value::Array(ids) => match ids.into_iter().next() {
                Some(Value::Number(id)) => Ok(LeadId(id)),
                _ => Err(RpcError::Decode("create returned an empty id list".to_string())),
            },
            other => Err(RpcError::Decode(format!("create returned {other}"))),
        }
    }

    async fn read(
        &self,
        model: &str,
        ids: &[LeadId],
        fields: &[&str],
    ) -> Result<Vec<FieldMap>, RpcError> {
        let ids = Value::Array(ids.iter().map(LeadId::to_value).collect());
        let mut kwargs = Map::new();
        if !fields.is_empty() {
            kwargs.insert("fields".to_string(), field_list(fields));
        }
        records(self.execute_kw(model, "read", vec![ids], kwargs).await?)
    }

    async fn search_count(&self, model: &str, domain: Value) -> Result<u64, RpcError> {
        let result = self.execute_kw(model, "search_count", vec![domain], Map::new()).await?;
        result.as_u64().ok_or_else(|| RpcError::Decode(format!("search_count returned {result}")))
    }

    async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<FieldMap>, RpcError> {
        let mut kwargs = Map::new();
        if !fields.is_empty() {
            kwargs.insert("fields".to_string(), field_list(fields));
        }
        if let Some(limit) = limit {
            kwargs.insert("limit".to_string(), json!(limit));
        }
        records(self.execute_kw(model, "search_read", vec![domain], kwargs).await?)
    }
}
