use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadbridge_core::config::{detect_config_path, AppConfig};
use toml::Value;

use crate::commands::ConfigSource;

pub fn run(source: &ConfigSource) -> String {
    let config = match source.load() {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = source.path.clone().or_else(detect_config_path);
    render(&config, config_file_path)
}

fn render(config: &AppConfig, config_file_path: Option<PathBuf>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "crm.url",
        config.crm.url.as_deref().unwrap_or("<unset>"),
        source("crm.url", &["LEADBRIDGE_CRM_URL", "ODOO_URL"]),
    ));
    lines.push(render_line(
        "crm.database",
        config.crm.database.as_deref().unwrap_or("<unset>"),
        source("crm.database", &["LEADBRIDGE_CRM_DATABASE", "ODOO_DB"]),
    ));
    lines.push(render_line(
        "crm.username",
        config.crm.username.as_deref().unwrap_or("<unset>"),
        source("crm.username", &["LEADBRIDGE_CRM_USERNAME", "ODOO_LOGIN"]),
    ));
    lines.push(render_line(
        "crm.password",
        redact(config.crm.password.is_some()),
        source("crm.password", &["LEADBRIDGE_CRM_PASSWORD", "ODOO_PASSWORD"]),
    ));

    lines.push(render_line(
        "llm.api_key",
        redact(config.llm.api_key.is_some()),
        source("llm.api_key", &["LEADBRIDGE_LLM_API_KEY", "OPENAI_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", &["LEADBRIDGE_LLM_BASE_URL"]),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", &["LEADBRIDGE_LLM_MODEL"])));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["LEADBRIDGE_LLM_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "transport.timeout_secs",
        &config.transport.timeout_secs.to_string(),
        source("transport.timeout_secs", &["LEADBRIDGE_TRANSPORT_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "transport.secure_port",
        &config.transport.secure_port.to_string(),
        source("transport.secure_port", &["LEADBRIDGE_TRANSPORT_SECURE_PORT"]),
    ));
    lines.push(render_line(
        "transport.plaintext_port",
        &config.transport.plaintext_port.to_string(),
        source("transport.plaintext_port", &["LEADBRIDGE_TRANSPORT_PLAINTEXT_PORT"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["LEADBRIDGE_LOGGING_LEVEL", "LEADBRIDGE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["LEADBRIDGE_LOGGING_FORMAT", "LEADBRIDGE_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}
