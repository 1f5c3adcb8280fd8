use std::fmt;

use serde::Serialize;

use crate::config::TransportConfig;

/// Scheme/port combination used to reach the remote CRM. Variants are
/// tried in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Secure,
    Plaintext,
}

impl Transport {
    pub const PRIORITY: [Transport; 2] = [Self::Secure, Self::Plaintext];

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Secure => "https",
            Self::Plaintext => "http",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Secure => "HTTPS",
            Self::Plaintext => "HTTP",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportPorts {
    pub secure: u16,
    pub plaintext: u16,
}

impl Default for TransportPorts {
    fn default() -> Self {
        Self { secure: 443, plaintext: 8069 }
    }
}

impl From<&TransportConfig> for TransportPorts {
    fn from(config: &TransportConfig) -> Self {
        Self { secure: config.secure_port, plaintext: config.plaintext_port }
    }
}

impl TransportPorts {
    pub fn port_for(&self, transport: Transport) -> u16 {
        match transport {
            Transport::Secure => self.secure,
            Transport::Plaintext => self.plaintext,
        }
    }
}

/// One concrete place to try: normalized host plus transport variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(transport: Transport, host: impl Into<String>, ports: TransportPorts) -> Self {
        Self { transport, host: host.into(), port: ports.port_for(transport) }
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.transport.scheme(), self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Strips surrounding whitespace, a leading `scheme://` token and one
/// trailing `/`. `None` when nothing is left.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => trimmed,
    };
    let host = without_scheme.strip_suffix('/').unwrap_or(without_scheme);

    (!host.is_empty()).then(|| host.to_string())
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

pub const MAX_ERROR_CHARS: usize = 100;

/// Bounds upstream error text for status display.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_CHARS {
        return message.to_string();
    }

    let mut truncated: String = message.chars().take(MAX_ERROR_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::{normalize_address, truncate_error, Endpoint, Transport, TransportPorts};

    #[test]
    fn normalization_strips_scheme_and_one_trailing_slash() {
        assert_eq!(normalize_address("https://acme.odoo.com/").as_deref(), Some("acme.odoo.com"));
        assert_eq!(normalize_address("http://10.0.0.5").as_deref(), Some("10.0.0.5"));
        assert_eq!(normalize_address("  crm.internal  ").as_deref(), Some("crm.internal"));
        assert_eq!(normalize_address("crm.internal//").as_deref(), Some("crm.internal/"));
        assert_eq!(
            normalize_address("jsonrpc+ssl://crm.internal").as_deref(),
            Some("crm.internal")
        );
    }

    #[test]
    fn normalization_rejects_empty_addresses() {
        assert_eq!(normalize_address(""), None);
        assert_eq!(normalize_address("https://"), None);
        assert_eq!(normalize_address("https:///"), None);
    }

    #[test]
    fn endpoints_use_the_canonical_port_of_each_transport() {
        let ports = TransportPorts::default();

        let secure = Endpoint::new(Transport::Secure, "acme.odoo.com", ports);
        let plaintext = Endpoint::new(Transport::Plaintext, "acme.odoo.com", ports);

        assert_eq!(secure.base_url(), "https://acme.odoo.com:443");
        assert_eq!(plaintext.base_url(), "http://acme.odoo.com:8069");
    }

    #[test]
    fn long_errors_are_truncated_with_marker() {
        let long = "x".repeat(150);

        let truncated = truncate_error(&long);

        assert_eq!(truncated.len(), 103);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_error("refused"), "refused");
    }
}
