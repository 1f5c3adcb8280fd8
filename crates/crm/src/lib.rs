//! Odoo JSON-RPC implementation of the CRM boundary.

pub mod rpc;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadbridge_core::connection::{CrmConnector, CrmSession, Endpoint, RpcError};
use leadbridge_core::settings::CrmCredentials;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::info;

pub use rpc::JsonRpcClient;
pub use session::OdooSession;

/// Logs in over `common.login` and hands out [`OdooSession`]s. One HTTP
/// client is shared by every endpoint and session.
#[derive(Clone, Debug)]
pub struct OdooConnector {
    http: reqwest::Client,
}

impl OdooConnector {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("leadbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| RpcError::Transport(error.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl CrmConnector for OdooConnector {
    async fn login(
        &self,
        endpoint: &Endpoint,
        credentials: &CrmCredentials,
    ) -> Result<Arc<dyn CrmSession>, RpcError> {
        let rpc = JsonRpcClient::new(self.http.clone(), endpoint.base_url());
        let result = rpc
            .call(
                "common",
                "login",
                vec![
                    Value::String(credentials.tenant.clone()),
                    Value::String(credentials.username.clone()),
                    Value::String(credentials.secret.expose_secret().to_string()),
                ],
            )
            .await?;

        // A rejected login is a successful call whose result is `false`.
        let uid = match result {
            Value::Number(uid) => uid
                .as_i64()
                .filter(|uid| *uid > 0)
                .ok_or_else(|| RpcError::Authentication(format!("invalid uid {uid}")))?,
            Value::Bool(false) => {
                return Err(RpcError::Authentication(format!(
                    "invalid credentials for {} on database {}",
                    credentials.username, credentials.tenant
                )));
            }
            other => return Err(RpcError::Decode(format!("login returned {other}"))),
        };

        info!(
            event_name = "crm.rpc.login",
            endpoint = %endpoint,
            database = %credentials.tenant,
            uid,
            "authenticated against Odoo"
        );
        Ok(Arc::new(OdooSession::new(
            rpc,
            credentials.tenant.clone(),
            uid,
            credentials.secret.clone(),
        )))
    }
}
