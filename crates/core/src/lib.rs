pub mod completion;
pub mod config;
pub mod connection;
pub mod domain;
pub mod errors;
pub mod operations;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use completion::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use connection::{
    ConnectionFailure, ConnectionManager, ConnectionState, CrmConnector, CrmSession, Endpoint,
    RpcError, Transport, TransportPorts,
};
pub use domain::{FieldMap, LeadId, LeadInput};
pub use errors::{ErrorKind, OperationError, OperationResult};
pub use operations::{
    CompletionOutcome, ConfigureOutcome, ConnectionDiagnosis, CrmOperations, IngestReport,
};
pub use settings::{CrmCredentials, CrmField, Settings, SettingsError, SettingsView};
