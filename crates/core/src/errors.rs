use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::settings::{join_fields, CrmField, SettingsError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingConfig,
    ConnectionUnavailable,
    InvalidInput,
    NotFound,
    RemoteError,
    CompletionUnavailable,
    UnknownOperation,
    ValidationError,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingConfig => "missing_config",
            Self::ConnectionUnavailable => "connection_unavailable",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::RemoteError => "remote_error",
            Self::CompletionUnavailable => "completion_unavailable",
            Self::UnknownOperation => "unknown_operation",
            Self::ValidationError => "validation_error",
            Self::Internal => "internal",
        }
    }
}

/// Classified failure of a tool operation. Every operation reports one of
/// these instead of a raw fault.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("CRM configuration incomplete, missing: {}{}", join_fields(.missing), context_suffix(.context))]
    MissingConfig { missing: BTreeSet<CrmField>, context: Option<String> },
    #[error("CRM connection unavailable: {0}")]
    ConnectionUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote CRM error: {0}")]
    RemoteError(String),
    #[error("completion service unavailable: {0}")]
    CompletionUnavailable(String),
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("invalid arguments{}: {message}", field_suffix(.field))]
    ValidationError { field: Option<String>, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

pub type OperationResult<T> = Result<T, OperationError>;

impl OperationError {
    pub fn missing_config(missing: BTreeSet<CrmField>) -> Self {
        Self::MissingConfig { missing, context: None }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingConfig { .. } => ErrorKind::MissingConfig,
            Self::ConnectionUnavailable(_) => ErrorKind::ConnectionUnavailable,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RemoteError(_) => ErrorKind::RemoteError,
            Self::CompletionUnavailable(_) => ErrorKind::CompletionUnavailable,
            Self::UnknownOperation(_) => ErrorKind::UnknownOperation,
            Self::ValidationError { .. } => ErrorKind::ValidationError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Same kind, message prefixed with `context: `. Used to attribute a
    /// failure to one item of a batch.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            Self::MissingConfig { missing, context: inner } => Self::MissingConfig {
                missing,
                context: Some(match inner {
                    Some(inner) => format!("{context}: {inner}"),
                    None => context.to_string(),
                }),
            },
            Self::ConnectionUnavailable(message) => {
                Self::ConnectionUnavailable(format!("{context}: {message}"))
            }
            Self::InvalidInput(message) => Self::InvalidInput(format!("{context}: {message}")),
            Self::NotFound(message) => Self::NotFound(format!("{context}: {message}")),
            Self::RemoteError(message) => Self::RemoteError(format!("{context}: {message}")),
            Self::CompletionUnavailable(message) => {
                Self::CompletionUnavailable(format!("{context}: {message}"))
            }
            Self::UnknownOperation(name) => Self::UnknownOperation(name),
            Self::ValidationError { field, message } => {
                Self::ValidationError { field, message: format!("{context}: {message}") }
            }
            Self::Internal(message) => Self::Internal(format!("{context}: {message}")),
        }
    }
}

impl From<SettingsError> for OperationError {
    fn from(value: SettingsError) -> Self {
        match value {
            SettingsError::EmptyFields(ref fields) => Self::ValidationError {
                field: fields.iter().next().map(|field| field.as_str().to_string()),
                message: value.to_string(),
            },
        }
    }
}

fn context_suffix(context: &Option<String>) -> String {
    context.as_ref().map(|context| format!(" ({context})")).unwrap_or_default()
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_ref().map(|field| format!(" (field `{field}`)")).unwrap_or_default()
}
