use std::sync::Arc;

use leadbridge_agent::crm_registry;
use leadbridge_core::connection::{ConnectionManager, TransportPorts};
use leadbridge_core::domain::{LEAD_MODEL, STAGE_MODEL};
use leadbridge_core::operations::CrmOperations;
use leadbridge_core::settings::Settings;
use leadbridge_core::testing::{configured_settings, StubCompletion, StubConnector};
use leadbridge_mcp::{LeadbridgeMcpServer, LEADS_URI, LEAD_URI_TEMPLATE, STAGES_URI};
use rmcp::ServerHandler;
use serde_json::{json, Value};

fn server(settings: Settings) -> (LeadbridgeMcpServer, Arc<StubConnector>) {
    let connector = Arc::new(StubConnector::default());
    let manager = ConnectionManager::new(settings, connector.clone(), TransportPorts::default());
    let operations = Arc::new(CrmOperations::new(
        Arc::new(manager),
        Arc::new(StubCompletion::replying("Interest: 64")),
        "gpt-4o-mini",
    ));
    let registry = Arc::new(crm_registry(operations.clone()));
    (LeadbridgeMcpServer::new(registry, operations), connector)
}

fn first_text(content: &impl serde::Serialize) -> Value {
    let serialized = serde_json::to_value(content).expect("serialize content");
    let text = serialized[0]["text"].as_str().expect("text content").to_string();
    serde_json::from_str(&text).expect("content is JSON")
}

#[test]
fn advertises_tools_and_resources() {
    let (server, _) = server(Settings::default());

    let info = server.get_info();

    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_some());
    assert!(info.instructions.as_deref().is_some_and(|text| text.contains("envelope")));
}

#[test]
fn tool_listing_mirrors_the_registry() {
    let (server, _) = server(Settings::default());

    let tools = server.tools();

    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_ref()).collect();
    assert_eq!(names.len(), 10);
    assert_eq!(names[0], "create_lead");
    assert!(names.contains(&"configure_connection"));
    assert_eq!(tools[0].input_schema.get("type"), Some(&json!("object")));
}

#[tokio::test]
async fn successful_calls_carry_the_success_envelope() {
    let (server, connector) = server(configured_settings());
    let arguments = json!({ "name": "Acme rollout" }).as_object().cloned();

    let result = server.call("create_lead", arguments).await;

    assert_ne!(result.is_error, Some(true));
    assert_eq!(first_text(&result.content), json!({ "success": true, "payload": { "lead_id": 1 } }));
    assert_eq!(connector.crm().created_names(LEAD_MODEL), vec!["Acme rollout".to_string()]);
}

#[tokio::test]
async fn failures_are_flagged_but_stay_in_the_envelope() {
    let (server, _) = server(Settings::default());

    let result = server.call("summarize_opportunity", json!({ "lead_id": 42 }).as_object().cloned()).await;
    let unknown = server.call("drop_tables", None).await;

    assert_eq!(result.is_error, Some(true));
    let body = first_text(&result.content);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["kind"], json!("missing_config"));
    assert_eq!(first_text(&unknown.content)["error"]["kind"], json!("unknown_operation"));
}

#[tokio::test]
async fn resources_render_crm_data_as_json() {
    let (server, connector) = server(configured_settings());
    connector.crm().insert(LEAD_MODEL, 5, json!({ "name": "Acme Deal", "stage_id": [2, "Proposition"] }));
    connector.crm().insert(STAGE_MODEL, 2, json!({ "name": "Proposition", "sequence": 3, "fold": false }));

    let leads = server.read(LEADS_URI).await.expect("leads resource");
    let stages = server.read(STAGES_URI).await.expect("stages resource");
    let lead = server.read("crm://lead/5").await.expect("lead resource");

    assert_eq!(first_text(&leads.contents)[0]["stage"], json!("Proposition"));
    assert_eq!(first_text(&stages.contents)[0]["name"], json!("Proposition"));
    assert_eq!(first_text(&lead.contents)["name"], json!("Acme Deal"));
}

#[tokio::test]
async fn resource_failures_use_the_error_envelope() {
    let (server, _) = server(configured_settings());

    let missing = server.read("crm://lead/404").await.expect("rendered failure");
    let malformed = server.read("crm://lead/abc").await.expect("rendered failure");

    assert_eq!(first_text(&missing.contents)["error"]["kind"], json!("not_found"));
    assert_eq!(first_text(&malformed.contents)["error"]["kind"], json!("invalid_input"));
    assert!(server.read("crm://unknown").await.is_err());
}

#[test]
fn lead_template_is_listed() {
    let (server, _) = server(Settings::default());

    let templates = serde_json::to_value(server.resource_templates()).expect("serialize templates");

    assert_eq!(templates[0]["uriTemplate"], json!(LEAD_URI_TEMPLATE));
}
