use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub llm: LlmConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Remote CRM access. Every field starts absent; the process runs
/// unconfigured until these are supplied.
#[derive(Clone, Debug, Default)]
pub struct CrmConfig {
    pub url: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    pub secure_port: u16,
    pub plaintext_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub crm_url: Option<String>,
    pub crm_database: Option<String>,
    pub crm_username: Option<String>,
    pub crm_password: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["leadbridge.toml", "config/leadbridge.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crm: CrmConfig::default(),
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
            },
            transport: TransportConfig { timeout_secs: 30, secure_port: 443, plaintext_port: 8069 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(url) = crm.url {
                self.crm.url = present(url);
            }
            if let Some(database) = crm.database {
                self.crm.database = present(database);
            }
            if let Some(username) = crm.username {
                self.crm.username = present(username);
            }
            if let Some(crm_password_value) = crm.password {
                self.crm.password = present(crm_password_value).map(secret_value);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = present(llm_api_key_value).map(secret_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(transport) = patch.transport {
            if let Some(timeout_secs) = transport.timeout_secs {
                self.transport.timeout_secs = timeout_secs;
            }
            if let Some(secure_port) = transport.secure_port {
                self.transport.secure_port = secure_port;
            }
            if let Some(plaintext_port) = transport.plaintext_port {
                self.transport.plaintext_port = plaintext_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_with_fallback("LEADBRIDGE_CRM_URL", "ODOO_URL") {
            self.crm.url = Some(value);
        }
        if let Some(value) = read_env_with_fallback("LEADBRIDGE_CRM_DATABASE", "ODOO_DB") {
            self.crm.database = Some(value);
        }
        if let Some(value) = read_env_with_fallback("LEADBRIDGE_CRM_USERNAME", "ODOO_LOGIN") {
            self.crm.username = Some(value);
        }
        if let Some(value) = read_env_with_fallback("LEADBRIDGE_CRM_PASSWORD", "ODOO_PASSWORD") {
            self.crm.password = Some(secret_value(value));
        }

        if let Some(value) = read_env_with_fallback("LEADBRIDGE_LLM_API_KEY", "OPENAI_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADBRIDGE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("LEADBRIDGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADBRIDGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEADBRIDGE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADBRIDGE_TRANSPORT_TIMEOUT_SECS") {
            self.transport.timeout_secs = parse_u64("LEADBRIDGE_TRANSPORT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADBRIDGE_TRANSPORT_SECURE_PORT") {
            self.transport.secure_port = parse_u16("LEADBRIDGE_TRANSPORT_SECURE_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADBRIDGE_TRANSPORT_PLAINTEXT_PORT") {
            self.transport.plaintext_port =
                parse_u16("LEADBRIDGE_TRANSPORT_PLAINTEXT_PORT", &value)?;
        }

        let log_level =
            read_env("LEADBRIDGE_LOGGING_LEVEL").or_else(|| read_env("LEADBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADBRIDGE_LOGGING_FORMAT").or_else(|| read_env("LEADBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.crm_url {
            self.crm.url = present(url);
        }
        if let Some(database) = overrides.crm_database {
            self.crm.database = present(database);
        }
        if let Some(username) = overrides.crm_username {
            self.crm.username = present(username);
        }
        if let Some(crm_password) = overrides.crm_password {
            self.crm.password = present(crm_password).map(secret_value);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = present(llm_api_key).map(secret_value);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_transport(&self.transport)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Returns the first default config file present in the working directory.
pub fn detect_config_path() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    detect_config_path()
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_transport(transport: &TransportConfig) -> Result<(), ConfigError> {
    if transport.timeout_secs == 0 || transport.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "transport.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if transport.secure_port == 0 || transport.plaintext_port == 0 {
        return Err(ConfigError::Validation(
            "transport.secure_port and transport.plaintext_port must be greater than zero"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn present(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| value)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_with_fallback(key: &str, fallback: &str) -> Option<String> {
    read_env(key).or_else(|| read_env(fallback))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    llm: Option<LlmPatch>,
    transport: Option<TransportPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    url: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportPatch {
    timeout_secs: Option<u64>,
    secure_port: Option<u16>,
    plaintext_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
