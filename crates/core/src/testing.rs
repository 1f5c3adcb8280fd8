//! In-process doubles for the remote CRM and the completion service.
//!
//! Compiled for this crate's tests and for dependents that enable the
//! `testing` feature in their dev-dependencies.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::connection::{CrmConnector, CrmSession, Endpoint, RpcError, Transport};
use crate::domain::{FieldMap, LeadId};
use crate::settings::{CrmCredentials, Settings};

/// Complete CRM settings plus a completion key.
pub fn configured_settings() -> Settings {
    let mut settings = crm_only_settings();
    settings.update_completion_key(Some("sk-test"));
    settings
}

/// Complete CRM settings without a completion key.
pub fn crm_only_settings() -> Settings {
    let mut settings = Settings::default();
    let _ = settings.update("acme.example.com", "sales", "bot", "secret");
    settings
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug, Default)]
struct TransportFailures {
    secure: Option<String>,
    plaintext: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoginAttempt {
    pub transport: Transport,
    pub url: String,
    pub username: String,
    pub secret: String,
}

/// Connector whose transports succeed unless told otherwise. Every session
/// it hands out shares one [`StubCrm`].
#[derive(Default)]
pub struct StubConnector {
    failures: Mutex<TransportFailures>,
    login_delay: Option<Duration>,
    attempts: Mutex<Vec<LoginAttempt>>,
    crm: Arc<StubCrm>,
}

impl StubConnector {
    pub fn fail_secure(self, message: &str) -> Self {
        lock(&self.failures).secure = Some(message.to_string());
        self
    }

    pub fn fail_plaintext(self, message: &str) -> Self {
        lock(&self.failures).plaintext = Some(message.to_string());
        self
    }

    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    pub fn set_failures(&self, secure: Option<&str>, plaintext: Option<&str>) {
        *lock(&self.failures) = TransportFailures {
            secure: secure.map(str::to_string),
            plaintext: plaintext.map(str::to_string),
        };
    }

    pub fn crm(&self) -> Arc<StubCrm> {
        self.crm.clone()
    }

    pub fn attempt_count(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn attempted_transports(&self) -> Vec<Transport> {
        lock(&self.attempts).iter().map(|attempt| attempt.transport).collect()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        lock(&self.attempts).iter().map(|attempt| attempt.url.clone()).collect()
    }

    /// `(username, secret)` of every login attempt, in order.
    pub fn login_credentials(&self) -> Vec<(String, String)> {
        lock(&self.attempts)
            .iter()
            .map(|attempt| (attempt.username.clone(), attempt.secret.clone()))
            .collect()
    }
}

#[async_trait]
impl CrmConnector for StubConnector {
    async fn login(
        &self,
        endpoint: &Endpoint,
        credentials: &CrmCredentials,
    ) -> Result<Arc<dyn CrmSession>, RpcError> {
        lock(&self.attempts).push(LoginAttempt {
            transport: endpoint.transport,
            url: endpoint.base_url(),
            username: credentials.username.clone(),
            secret: credentials.secret.expose_secret().to_string(),
        });
        if let Some(delay) = self.login_delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let failures = lock(&self.failures);
            match endpoint.transport {
                Transport::Secure => failures.secure.clone(),
                Transport::Plaintext => failures.plaintext.clone(),
            }
        };
        match failure {
            Some(message) => Err(RpcError::Transport(message)),
            None => Ok(Arc::new(StubSession { crm: self.crm.clone() })),
        }
    }
}

/// Record store behind [`StubSession`], with per-method call counters.
#[derive(Default)]
pub struct StubCrm {
    records: Mutex<BTreeMap<String, BTreeMap<i64, FieldMap>>>,
    next_id: Mutex<i64>,
    rejected_names: Mutex<BTreeMap<String, String>>,
    read_failure: Mutex<Option<String>>,
    creates: AtomicUsize,
    reads: AtomicUsize,
    counts: AtomicUsize,
    searches: AtomicUsize,
}

impl StubCrm {
    /// Seeds a record. `fields` must be a JSON object.
    pub fn insert(&self, model: &str, id: i64, fields: Value) {
        let mut record = match fields {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        };
        record.insert("id".to_string(), Value::from(id));
        lock(&self.records).entry(model.to_string()).or_default().insert(id, record);
        let mut next_id = lock(&self.next_id);
        *next_id = (*next_id).max(id);
    }

    /// Makes `create` fail for records with this exact name.
    pub fn reject_name(&self, name: &str, message: &str) {
        lock(&self.rejected_names).insert(name.to_string(), message.to_string());
    }

    pub fn fail_reads(&self, message: &str) {
        *lock(&self.read_failure) = Some(message.to_string());
    }

    pub fn record(&self, model: &str, id: i64) -> Option<FieldMap> {
        lock(&self.records).get(model)?.get(&id).cloned()
    }

    pub fn created_names(&self, model: &str) -> Vec<String> {
        lock(&self.records)
            .get(model)
            .map(|records| {
                records
                    .values()
                    .filter_map(|record| record.get("name")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.read_calls() + self.count_calls() + self.search_calls()
    }

    fn check_reads(&self) -> Result<(), RpcError> {
        match lock(&self.read_failure).clone() {
            Some(message) => Err(RpcError::Remote(message)),
            None => Ok(()),
        }
    }
}

fn project(record: &FieldMap, fields: &[&str]) -> FieldMap {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(key, _)| key.as_str() == "id" || fields.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub struct StubSession {
    crm: Arc<StubCrm>,
}

#[async_trait]
impl CrmSession for StubSession {
    async fn create(&self, model: &str, fields: FieldMap) -> Result<LeadId, RpcError> {
        self.crm.creates.fetch_add(1, Ordering::SeqCst);

        let name = fields.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
        if let Some(message) = lock(&self.crm.rejected_names).get(&name).cloned() {
            return Err(RpcError::Remote(message));
        }

        let id = {
            let mut next_id = lock(&self.crm.next_id);
            *next_id += 1;
            *next_id
        };
        let mut record = fields;
        record.insert("id".to_string(), Value::from(id));
        lock(&self.crm.records).entry(model.to_string()).or_default().insert(id, record);
        Ok(LeadId::from(id))
    }

    async fn read(
        &self,
        model: &str,
        ids: &[LeadId],
        fields: &[&str],
    ) -> Result<Vec<FieldMap>, RpcError> {
        self.crm.reads.fetch_add(1, Ordering::SeqCst);
        self.crm.check_reads()?;

        let records = lock(&self.crm.records);
        let Some(table) = records.get(model) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| id.0.as_i64())
            .filter_map(|id| table.get(&id))
            .map(|record| project(record, fields))
            .collect())
    }

    async fn search_count(&self, model: &str, _domain: Value) -> Result<u64, RpcError> {
        self.crm.counts.fetch_add(1, Ordering::SeqCst);
        self.crm.check_reads()?;

        let records = lock(&self.crm.records);
        Ok(records.get(model).map_or(0, |table| table.len() as u64))
    }

    async fn search_read(
        &self,
        model: &str,
        _domain: Value,
        fields: &[&str],
        limit: Option<u32>,
    ) -> Result<Vec<FieldMap>, RpcError> {
        self.crm.searches.fetch_add(1, Ordering::SeqCst);
        self.crm.check_reads()?;

        let records = lock(&self.crm.records);
        let Some(table) = records.get(model) else {
            return Ok(Vec::new());
        };
        let limit = limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(table.values().take(limit).map(|record| project(record, fields)).collect())
    }
}

/// Completion double returning a canned reply and recording every request.
pub struct StubCompletion {
    reply: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
    keys: Mutex<Vec<String>>,
}

impl StubCompletion {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.to_string()), requests: Mutex::default(), keys: Mutex::default() }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: Mutex::default(),
            keys: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn keys_used(&self) -> Vec<String> {
        lock(&self.keys).clone()
    }
}

#[async_trait]
impl CompletionClient for StubCompletion {
    async fn complete(
        &self,
        api_key: &SecretString,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        lock(&self.keys).push(api_key.expose_secret().to_string());
        lock(&self.requests).push(request);
        self.reply.clone().map_err(CompletionError)
    }
}
