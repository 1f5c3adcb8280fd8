use std::sync::Arc;
use std::time::Duration;

use leadbridge_core::config::AppConfig;
use leadbridge_core::connection::{ConnectionManager, CrmConnector, TransportPorts};
use leadbridge_core::settings::{join_fields, Settings};
use leadbridge_crm::OdooConnector;
use serde::Serialize;

use crate::commands::{block_on, CommandResult, ConfigSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(source: &ConfigSource, json_output: bool) -> CommandResult {
    run_with(source, json_output, |config| {
        OdooConnector::new(Duration::from_secs(config.transport.timeout_secs))
            .map(|connector| Arc::new(connector) as Arc<dyn CrmConnector>)
            .map_err(|error| format!("could not build CRM connector: {error}"))
    })
}

/// Same as [`run`] with the connector supplied by the caller.
pub fn run_with<F>(source: &ConfigSource, json_output: bool, connector: F) -> CommandResult
where
    F: FnOnce(&AppConfig) -> Result<Arc<dyn CrmConnector>, String>,
{
    let report = build_report(source, connector);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report<F>(source: &ConfigSource, connector: F) -> DoctorReport
where
    F: FnOnce(&AppConfig) -> Result<Arc<dyn CrmConnector>, String>,
{
    let mut checks = Vec::new();

    match source.load() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });

            let settings = Settings::from_config(&config);
            checks.push(check_crm_settings(&settings));
            checks.push(check_completion_key(&settings));
            checks.push(check_crm_connection(&config, settings, connector));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["crm_settings", "completion_key", "crm_connection"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_crm_settings(settings: &Settings) -> DoctorCheck {
    let missing = settings.missing_crm_fields();
    if missing.is_empty() {
        DoctorCheck {
            name: "crm_settings",
            status: CheckStatus::Pass,
            details: format!(
                "target `{}` database `{}`",
                settings.remote_address().unwrap_or_default(),
                settings.tenant().unwrap_or_default()
            ),
        }
    } else {
        let env_vars: Vec<&str> = missing.iter().map(|field| field.env_var()).collect();
        DoctorCheck {
            name: "crm_settings",
            status: CheckStatus::Fail,
            details: format!("missing {} (set {})", join_fields(&missing), env_vars.join(", ")),
        }
    }
}

fn check_completion_key(settings: &Settings) -> DoctorCheck {
    if settings.is_completion_configured() {
        DoctorCheck {
            name: "completion_key",
            status: CheckStatus::Pass,
            details: "completion API key present".to_string(),
        }
    } else {
        DoctorCheck {
            name: "completion_key",
            status: CheckStatus::Fail,
            details: "no completion API key; qualify_lead and generate_offer will fail".to_string(),
        }
    }
}

fn check_crm_connection<F>(config: &AppConfig, settings: Settings, connector: F) -> DoctorCheck
where
    F: FnOnce(&AppConfig) -> Result<Arc<dyn CrmConnector>, String>,
{
    if !settings.is_crm_configured() {
        return DoctorCheck {
            name: "crm_connection",
            status: CheckStatus::Skipped,
            details: "skipped because CRM settings are incomplete".to_string(),
        };
    }

    let connector = match connector(config) {
        Ok(connector) => connector,
        Err(error) => {
            return DoctorCheck { name: "crm_connection", status: CheckStatus::Fail, details: error };
        }
    };

    let manager = ConnectionManager::new(settings, connector, TransportPorts::from(&config.transport));
    let attempt = block_on(async {
        let outcome = manager.connect().await;
        (outcome, manager.status().await)
    });
    match attempt {
        Ok((Ok(_), status)) => {
            DoctorCheck { name: "crm_connection", status: CheckStatus::Pass, details: status }
        }
        Ok((Err(failure), _)) => DoctorCheck {
            name: "crm_connection",
            status: CheckStatus::Fail,
            details: failure.to_string(),
        },
        Err(error) => DoctorCheck { name: "crm_connection", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
