//! Runtime CRM and completion-service settings.
//!
//! `Settings` is the in-memory holder that the connection manager reads
//! before every connect attempt. It performs no I/O.

use std::collections::BTreeSet;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmField {
    Url,
    Database,
    Username,
    Password,
}

impl CrmField {
    pub const ALL: [CrmField; 4] = [Self::Url, Self::Database, Self::Username, Self::Password];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Database => "database",
            Self::Username => "username",
            Self::Password => "password",
        }
    }

    /// Environment variable that supplies this field at startup.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Url => "LEADBRIDGE_CRM_URL",
            Self::Database => "LEADBRIDGE_CRM_DATABASE",
            Self::Username => "LEADBRIDGE_CRM_USERNAME",
            Self::Password => "LEADBRIDGE_CRM_PASSWORD",
        }
    }
}

impl fmt::Display for CrmField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a field set as `url, database` in declaration order.
pub fn join_fields(fields: &BTreeSet<CrmField>) -> String {
    fields.iter().map(CrmField::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("required CRM settings are empty: {}", join_fields(.0))]
    EmptyFields(BTreeSet<CrmField>),
}

/// Credentials handed to a connector. Built only from a complete settings
/// snapshot, so the four values always belong to the same update.
#[derive(Clone, Debug)]
pub struct CrmCredentials {
    pub remote_address: String,
    pub tenant: String,
    pub username: String,
    pub secret: SecretString,
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    remote_address: Option<String>,
    tenant: Option<String>,
    username: Option<String>,
    secret: Option<SecretString>,
    completion_api_key: Option<SecretString>,
}

/// Redacted view for status pages and diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettingsView {
    pub url: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: &'static str,
    pub completion_key: &'static str,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            remote_address: config.crm.url.as_deref().and_then(non_blank),
            tenant: config.crm.database.as_deref().and_then(non_blank),
            username: config.crm.username.as_deref().and_then(non_blank),
            secret: config.crm.password.clone().filter(|value| !is_blank_secret(value)),
            completion_api_key: config
                .llm
                .api_key
                .clone()
                .filter(|value| !is_blank_secret(value)),
        }
    }

    /// Replaces all four CRM fields or none of them.
    pub fn update(
        &mut self,
        remote_address: &str,
        tenant: &str,
        username: &str,
        secret: &str,
    ) -> Result<(), SettingsError> {
        let candidates = [
            (CrmField::Url, remote_address),
            (CrmField::Database, tenant),
            (CrmField::Username, username),
            (CrmField::Password, secret),
        ];
        let empty: BTreeSet<CrmField> = candidates
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !empty.is_empty() {
            return Err(SettingsError::EmptyFields(empty));
        }

        self.remote_address = Some(remote_address.trim().to_string());
        self.tenant = Some(tenant.trim().to_string());
        self.username = Some(username.trim().to_string());
        self.secret = Some(secret.to_string().into());
        Ok(())
    }

    /// A blank key clears the completion configuration.
    pub fn update_completion_key(&mut self, key: Option<&str>) {
        self.completion_api_key = key.and_then(non_blank).map(SecretString::from);
    }

    pub fn is_crm_configured(&self) -> bool {
        self.missing_crm_fields().is_empty()
    }

    pub fn missing_crm_fields(&self) -> BTreeSet<CrmField> {
        let mut missing = BTreeSet::new();
        if self.remote_address.is_none() {
            missing.insert(CrmField::Url);
        }
        if self.tenant.is_none() {
            missing.insert(CrmField::Database);
        }
        if self.username.is_none() {
            missing.insert(CrmField::Username);
        }
        if self.secret.is_none() {
            missing.insert(CrmField::Password);
        }
        missing
    }

    pub fn is_completion_configured(&self) -> bool {
        self.completion_api_key.is_some()
    }

    pub fn completion_api_key(&self) -> Option<&SecretString> {
        self.completion_api_key.as_ref()
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// `None` unless every CRM field is present.
    pub fn credentials(&self) -> Option<CrmCredentials> {
        Some(CrmCredentials {
            remote_address: self.remote_address.clone()?,
            tenant: self.tenant.clone()?,
            username: self.username.clone()?,
            secret: self.secret.clone()?,
        })
    }

    pub fn describe(&self) -> SettingsView {
        SettingsView {
            url: self.remote_address.clone(),
            database: self.tenant.clone(),
            username: self.username.clone(),
            password: if self.secret.is_some() { "set" } else { "unset" },
            completion_key: if self.completion_api_key.is_some() { "set" } else { "unset" },
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_blank_secret(value: &SecretString) -> bool {
    value.expose_secret().trim().is_empty()
}
