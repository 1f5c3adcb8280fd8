// Odoo JSON-RPC transport
//
// Every call is a POST to `{base}/jsonrpc` carrying
// `{"jsonrpc":"2.0","method":"call","params":{service, method, args}}`.
// Errors come back with HTTP 200 inside an `error` object.

use leadbridge_core::connection::{truncate_error, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: String,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl RpcFault {
    /// The server-side message is more useful than the generic
    /// "Odoo Server Error" envelope text.
    fn into_message(self) -> String {
        let data = self.data.unwrap_or(RpcFaultData { message: None, name: None });
        data.message
            .filter(|message| !message.trim().is_empty())
            .or(self.message)
            .or(data.name)
            .unwrap_or_else(|| "remote call failed without a message".to_string())
    }
}

/// Raw JSON-RPC client bound to one server root.
#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    base_url: String,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let url = format!("{}/jsonrpc", self.base_url);
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams { service, method, args },
            id: Uuid::new_v4().to_string(),
        };
        debug!(event_name = "crm.rpc.call", %url, service, method, "sending JSON-RPC call");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|error| RpcError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| RpcError::Transport(error.to_string()))?;
        trace!(%status, body_len = body.len(), "JSON-RPC response received");

        if !status.is_success() {
            return Err(RpcError::Status { status: status.as_u16(), body: truncate_error(&body) });
        }

        let envelope: RpcResponse = serde_json::from_str(&body)
            .map_err(|error| RpcError::Decode(format!("{error}: {}", truncate_error(&body))))?;
        if let Some(fault) = envelope.error {
            return Err(RpcError::Remote(fault.into_message()));
        }
        envelope.result.ok_or_else(|| RpcError::Decode("response has neither result nor error".to_string()))
    }
}
