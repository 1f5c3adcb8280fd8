//! Session lifecycle toward the remote CRM.
//!
//! The manager owns the only [`ConnectionState`] of the process. A connect
//! attempt normalizes the configured address and tries each [`Transport`]
//! in priority order (secure first), recording every failure so the status
//! line explains what happened. There is no background retry: callers ask
//! for [`ConnectionManager::reconnect`] explicitly.
//!
//! Settings writes and connect attempts serialize on one async gate, so a
//! session is always built from a single consistent credential snapshot.
//! Status and session reads never wait on network I/O.

pub mod remote;
pub mod transport;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::errors::OperationError;
use crate::settings::{join_fields, CrmField, Settings, SettingsError};

pub use remote::{CrmConnector, CrmSession, RpcError};
pub use transport::{normalize_address, truncate_error, Endpoint, Transport, TransportPorts};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionFailure {
    MissingConfig(BTreeSet<CrmField>),
    Transports { secure: String, plaintext: String },
    General(String),
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConfig(fields) => {
                write!(f, "not configured, missing: {}", join_fields(fields))
            }
            Self::Transports { secure, plaintext } => write!(
                f,
                "connection failed; {}: {secure} | {}: {plaintext}",
                Transport::Secure.label(),
                Transport::Plaintext.label()
            ),
            Self::General(message) => write!(f, "connection error: {message}"),
        }
    }
}

impl From<ConnectionFailure> for OperationError {
    fn from(value: ConnectionFailure) -> Self {
        match value {
            ConnectionFailure::MissingConfig(fields) => Self::missing_config(fields),
            other => Self::ConnectionUnavailable(other.to_string()),
        }
    }
}

pub enum ConnectionState {
    Unconfigured,
    Connecting {
        target: String,
    },
    Connected {
        session: Arc<dyn CrmSession>,
        transport: Transport,
        host: String,
        /// Truncated error of the secure variant when the plaintext one won.
        fallback_error: Option<String>,
        connected_at: DateTime<Utc>,
    },
    Failed(ConnectionFailure),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn transport(&self) -> Option<Transport> {
        match self {
            Self::Connected { transport, .. } => Some(*transport),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ConnectionFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("not connected"),
            Self::Connecting { target } => write!(f, "connecting to {target}..."),
            Self::Connected { transport, host, fallback_error, .. } => {
                write!(f, "connected to {host} ({})", transport.label())?;
                if let Some(error) = fallback_error {
                    write!(f, "; {} attempt failed: {error}", Transport::Secure.label())?;
                }
                Ok(())
            }
            Self::Failed(failure) => write!(f, "{failure}"),
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => f.write_str("Unconfigured"),
            Self::Connecting { target } => f.debug_struct("Connecting").field("target", target).finish(),
            Self::Connected { transport, host, fallback_error, connected_at, .. } => f
                .debug_struct("Connected")
                .field("transport", transport)
                .field("host", host)
                .field("fallback_error", fallback_error)
                .field("connected_at", connected_at)
                .finish_non_exhaustive(),
            Self::Failed(failure) => f.debug_tuple("Failed").field(failure).finish(),
        }
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn CrmConnector>,
    ports: TransportPorts,
    connect_gate: Mutex<()>,
    settings: RwLock<Settings>,
    state: RwLock<Arc<ConnectionState>>,
}

impl ConnectionManager {
    /// Builds a manager without touching the network. The state stays
    /// `Unconfigured` until the first connect; see [`Self::start`].
    pub fn new(settings: Settings, connector: Arc<dyn CrmConnector>, ports: TransportPorts) -> Self {
        Self {
            connector,
            ports,
            connect_gate: Mutex::new(()),
            settings: RwLock::new(settings),
            state: RwLock::new(Arc::new(ConnectionState::Unconfigured)),
        }
    }

    /// Builds a manager and, when the settings are complete, attempts the
    /// initial connection. Failure is recorded in the state, never returned.
    pub async fn start(
        settings: Settings,
        connector: Arc<dyn CrmConnector>,
        ports: TransportPorts,
    ) -> Self {
        let configured = settings.is_crm_configured();
        let manager = Self::new(settings, connector, ports);
        if configured {
            let _ = manager.connect().await;
        } else {
            info!(
                event_name = "crm.connection.unconfigured",
                missing = %join_fields(&manager.settings.read().await.missing_crm_fields()),
                "starting without CRM settings"
            );
        }
        manager
    }

    pub async fn connect(&self) -> Result<Transport, ConnectionFailure> {
        let gate = self.connect_gate.lock().await;
        self.connect_locked(&gate).await
    }

    /// Full re-attempt over every transport variant.
    pub async fn reconnect(&self) -> Result<Transport, ConnectionFailure> {
        self.connect().await
    }

    /// Replaces the CRM settings. Waits for any in-flight connect attempt.
    pub async fn update_settings(
        &self,
        remote_address: &str,
        tenant: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SettingsError> {
        let _gate = self.connect_gate.lock().await;
        self.settings.write().await.update(remote_address, tenant, username, secret)?;
        info!(
            event_name = "crm.settings.updated",
            host = %remote_address.trim(),
            tenant = %tenant.trim(),
            username = %username.trim(),
            "CRM settings replaced"
        );
        Ok(())
    }

    /// Replaces the CRM settings and connects with them, as one step.
    pub async fn configure(
        &self,
        remote_address: &str,
        tenant: &str,
        username: &str,
        secret: &str,
    ) -> Result<Result<Transport, ConnectionFailure>, SettingsError> {
        let gate = self.connect_gate.lock().await;
        self.settings.write().await.update(remote_address, tenant, username, secret)?;
        info!(
            event_name = "crm.settings.updated",
            host = %remote_address.trim(),
            tenant = %tenant.trim(),
            username = %username.trim(),
            "CRM settings replaced, reconnecting"
        );
        Ok(self.connect_locked(&gate).await)
    }

    pub async fn update_completion_key(&self, key: Option<&str>) {
        self.settings.write().await.update_completion_key(key);
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn state(&self) -> Arc<ConnectionState> {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> String {
        self.state.read().await.to_string()
    }

    /// The live session, if connected. Never reconnects.
    pub async fn active_session(&self) -> Option<Arc<dyn CrmSession>> {
        match self.state.read().await.as_ref() {
            ConnectionState::Connected { session, .. } => Some(session.clone()),
            _ => None,
        }
    }

    /// The live session, healing once through [`Self::reconnect`] when
    /// there is none.
    pub async fn session_or_reconnect(&self) -> Result<Arc<dyn CrmSession>, OperationError> {
        if let Some(session) = self.active_session().await {
            return Ok(session);
        }

        debug!(event_name = "crm.connection.heal", "no active session, reconnecting once");
        match self.reconnect().await {
            Ok(_) => self
                .active_session()
                .await
                .ok_or_else(|| OperationError::ConnectionUnavailable("session was replaced".to_string())),
            Err(failure) => Err(failure.into()),
        }
    }

    async fn connect_locked(&self, _gate: &MutexGuard<'_, ()>) -> Result<Transport, ConnectionFailure> {
        let snapshot = self.settings.read().await.clone();

        let Some(credentials) = snapshot.credentials() else {
            let missing = snapshot.missing_crm_fields();
            warn!(
                event_name = "crm.connection.missing_config",
                missing = %join_fields(&missing),
                "connect skipped, CRM settings incomplete"
            );
            return Err(self.fail(ConnectionFailure::MissingConfig(missing)).await);
        };

        let Some(host) = normalize_address(&credentials.remote_address) else {
            return Err(self
                .fail(ConnectionFailure::General(
                    "remote address is empty once scheme and trailing slash are removed"
                        .to_string(),
                ))
                .await);
        };

        self.replace_state(ConnectionState::Connecting { target: host.clone() }).await;

        let mut errors: Vec<(Transport, String)> = Vec::with_capacity(Transport::PRIORITY.len());
        for transport in Transport::PRIORITY {
            let endpoint = Endpoint::new(transport, host.clone(), self.ports);
            info!(
                event_name = "crm.connection.attempt",
                transport = transport.label(),
                endpoint = %endpoint,
                tenant = %credentials.tenant,
                "attempting CRM login"
            );

            match self.connector.login(&endpoint, &credentials).await {
                Ok(session) => {
                    let fallback_error = errors
                        .iter()
                        .find(|(tried, _)| *tried == Transport::Secure)
                        .map(|(_, error)| error.clone());
                    info!(
                        event_name = "crm.connection.connected",
                        transport = transport.label(),
                        host = %host,
                        "CRM session established"
                    );
                    self.replace_state(ConnectionState::Connected {
                        session,
                        transport,
                        host,
                        fallback_error,
                        connected_at: Utc::now(),
                    })
                    .await;
                    return Ok(transport);
                }
                Err(error) => {
                    warn!(
                        event_name = "crm.connection.attempt_failed",
                        transport = transport.label(),
                        host = %host,
                        error = %error,
                        "CRM login failed"
                    );
                    errors.push((transport, truncate_error(&error.to_string())));
                }
            }
        }

        let error_for = |wanted: Transport| {
            errors
                .iter()
                .find(|(tried, _)| *tried == wanted)
                .map(|(_, error)| error.clone())
                .unwrap_or_default()
        };
        let failure = ConnectionFailure::Transports {
            secure: error_for(Transport::Secure),
            plaintext: error_for(Transport::Plaintext),
        };
        Err(self.fail(failure).await)
    }

    async fn fail(&self, failure: ConnectionFailure) -> ConnectionFailure {
        self.replace_state(ConnectionState::Failed(failure.clone())).await;
        failure
    }

    async fn replace_state(&self, next: ConnectionState) {
        *self.state.write().await = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::connection::{
        ConnectionFailure, ConnectionManager, ConnectionState, Transport, TransportPorts,
    };
    use crate::errors::OperationError;
    use crate::settings::{CrmField, Settings};
    use crate::testing::{configured_settings, StubConnector};

    fn manager(settings: Settings, connector: &Arc<StubConnector>) -> ConnectionManager {
        ConnectionManager::new(settings, connector.clone(), TransportPorts::default())
    }

    #[tokio::test]
    async fn missing_config_fails_without_network_calls() {
        let connector = Arc::new(StubConnector::default());
        let mut settings = Settings::default();
        settings.update_completion_key(Some("sk-test"));
        let manager = manager(settings, &connector);

        let failure = manager.connect().await.expect_err("connect should fail");

        assert_eq!(failure, ConnectionFailure::MissingConfig(CrmField::ALL.into_iter().collect()));
        assert_eq!(connector.attempt_count(), 0);
        assert_eq!(
            manager.status().await,
            "not configured, missing: url, database, username, password"
        );
    }

    #[tokio::test]
    async fn start_without_settings_stays_unconfigured() {
        let connector = Arc::new(StubConnector::default());

        let manager =
            ConnectionManager::start(Settings::default(), connector.clone(), TransportPorts::default())
                .await;

        assert!(matches!(manager.state().await.as_ref(), ConnectionState::Unconfigured));
        assert_eq!(manager.status().await, "not connected");
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn start_with_settings_connects_immediately() {
        let connector = Arc::new(StubConnector::default());

        let manager =
            ConnectionManager::start(configured_settings(), connector.clone(), TransportPorts::default())
                .await;

        assert!(manager.state().await.is_connected());
        assert!(manager.active_session().await.is_some());
    }

    #[tokio::test]
    async fn secure_transport_wins_without_trying_plaintext() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(configured_settings(), &connector);

        let transport = manager.connect().await.expect("connect should succeed");

        assert_eq!(transport, Transport::Secure);
        assert_eq!(connector.attempted_transports(), vec![Transport::Secure]);
        assert_eq!(manager.status().await, "connected to acme.example.com (HTTPS)");
    }

    #[tokio::test]
    async fn plaintext_fallback_keeps_the_secure_error_in_status() {
        let connector = Arc::new(StubConnector::default().fail_secure("tls handshake refused"));
        let manager = manager(configured_settings(), &connector);

        let transport = manager.connect().await.expect("plaintext should succeed");

        assert_eq!(transport, Transport::Plaintext);
        assert_eq!(
            connector.attempted_transports(),
            vec![Transport::Secure, Transport::Plaintext]
        );
        let status = manager.status().await;
        assert!(status.starts_with("connected to acme.example.com (HTTP)"), "{status}");
        assert!(status.contains("tls handshake refused"), "{status}");
        assert_eq!(manager.state().await.transport(), Some(Transport::Plaintext));
    }

    #[tokio::test]
    async fn both_transport_errors_are_preserved_and_truncated() {
        let long_error = "e".repeat(180);
        let connector = Arc::new(
            StubConnector::default().fail_secure("certificate expired").fail_plaintext(&long_error),
        );
        let manager = manager(configured_settings(), &connector);

        let failure = manager.connect().await.expect_err("both transports fail");

        let ConnectionFailure::Transports { secure, plaintext } = &failure else {
            panic!("expected transport failure, got {failure:?}");
        };
        assert!(secure.contains("certificate expired"));
        assert_eq!(plaintext.chars().count(), 103);
        let status = manager.status().await;
        assert!(status.contains("HTTPS: transport failure: certificate expired"), "{status}");
        assert!(status.contains(" | HTTP: "), "{status}");
        assert!(manager.active_session().await.is_none());
    }

    #[tokio::test]
    async fn address_normalization_feeds_the_endpoint() {
        let connector = Arc::new(StubConnector::default());
        let mut settings = Settings::default();
        settings
            .update("https://acme.example.com/", "sales", "bot", "pw")
            .expect("settings update");
        let manager = manager(settings, &connector);

        manager.connect().await.expect("connect");

        assert_eq!(connector.attempted_urls(), vec!["https://acme.example.com:443".to_string()]);
    }

    #[tokio::test]
    async fn scheme_only_address_is_a_general_failure() {
        let connector = Arc::new(StubConnector::default());
        let mut settings = Settings::default();
        settings.update("https://", "sales", "bot", "pw").expect("settings update");
        let manager = manager(settings, &connector);

        let failure = manager.connect().await.expect_err("connect should fail");

        assert!(matches!(failure, ConnectionFailure::General(_)));
        assert_eq!(connector.attempt_count(), 0);
        assert!(manager.status().await.starts_with("connection error:"));
    }

    #[tokio::test]
    async fn active_session_never_reconnects() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(configured_settings(), &connector);

        assert!(manager.active_session().await.is_none());
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn session_or_reconnect_heals_once() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(configured_settings(), &connector);

        let session = manager.session_or_reconnect().await;

        assert!(session.is_ok());
        assert_eq!(connector.attempt_count(), 1);
        manager.session_or_reconnect().await.expect("cached session");
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn session_or_reconnect_reports_connection_unavailable() {
        let connector =
            Arc::new(StubConnector::default().fail_secure("refused").fail_plaintext("refused"));
        let manager = manager(configured_settings(), &connector);

        let error = manager.session_or_reconnect().await.err().expect("should fail");

        assert!(matches!(error, OperationError::ConnectionUnavailable(ref message) if message.contains("refused")));
        assert_eq!(connector.attempt_count(), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_replaces_a_previous_session() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(configured_settings(), &connector);
        manager.connect().await.expect("first connect");

        manager.update_settings("other.example.com", "sales", "bot", "pw").await.expect("update");
        connector.set_failures(Some("down"), Some("down"));
        let _ = manager.reconnect().await;

        assert!(manager.active_session().await.is_none());
        assert!(manager.state().await.failure().is_some());
    }

    #[tokio::test]
    async fn configure_updates_then_connects() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(Settings::default(), &connector);

        let outcome = manager
            .configure("http://new.example.com", "eu", "ops", "pw")
            .await
            .expect("settings are complete");

        assert_eq!(outcome, Ok(Transport::Secure));
        assert_eq!(manager.settings().await.remote_address(), Some("http://new.example.com"));
        assert_eq!(manager.status().await, "connected to new.example.com (HTTPS)");
    }

    #[tokio::test]
    async fn configure_rejects_blank_fields_without_connecting() {
        let connector = Arc::new(StubConnector::default());
        let manager = manager(Settings::default(), &connector);

        let error = manager.configure("crm", "", "ops", "pw").await.expect_err("blank tenant");

        assert_eq!(
            error,
            crate::settings::SettingsError::EmptyFields(BTreeSet::from([CrmField::Database]))
        );
        assert_eq!(connector.attempt_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn settings_update_waits_for_the_connect_in_flight() {
        let connector =
            Arc::new(StubConnector::default().with_login_delay(Duration::from_millis(80)));
        let mut settings = Settings::default();
        settings.update("acme.example.com", "sales", "old-user", "old-secret").expect("seed");
        let manager = Arc::new(manager(settings, &connector));

        let connecting = manager.clone();
        let connect = tokio::spawn(async move { connecting.connect().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(*manager.state().await, ConnectionState::Connecting { .. }));

        manager
            .update_settings("acme.example.com", "sales", "new-user", "new-secret")
            .await
            .expect("update");

        // The update only returns once the connect has finished with the old pair.
        assert!(manager.state().await.is_connected());
        assert_eq!(
            connector.login_credentials(),
            vec![("old-user".to_string(), "old-secret".to_string())]
        );
        assert_eq!(connect.await.expect("connect task"), Ok(Transport::Secure));

        manager.reconnect().await.expect("reconnect");
        assert_eq!(
            connector.login_credentials().last(),
            Some(&("new-user".to_string(), "new-secret".to_string()))
        );
    }
}
