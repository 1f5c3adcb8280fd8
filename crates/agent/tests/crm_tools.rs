use std::sync::Arc;

use leadbridge_agent::{crm_registry, Envelope, ToolRegistry, CRM_TOOL_NAMES};
use leadbridge_core::connection::{ConnectionManager, TransportPorts};
use leadbridge_core::domain::LEAD_MODEL;
use leadbridge_core::errors::{ErrorKind, OperationError};
use leadbridge_core::operations::CrmOperations;
use leadbridge_core::settings::Settings;
use leadbridge_core::testing::{configured_settings, StubCompletion, StubConnector};
use serde_json::json;

struct Fixture {
    registry: ToolRegistry,
    connector: Arc<StubConnector>,
}

fn fixture(settings: Settings) -> Fixture {
    let connector = Arc::new(StubConnector::default());
    let manager = ConnectionManager::new(settings, connector.clone(), TransportPorts::default());
    let ops = CrmOperations::new(
        Arc::new(manager),
        Arc::new(StubCompletion::replying("Interest: 64")),
        "gpt-4o-mini",
    );
    Fixture { registry: crm_registry(Arc::new(ops)), connector }
}

#[test]
fn discovery_lists_every_crm_tool_once() {
    let fixture = fixture(Settings::default());

    let descriptors = fixture.registry.descriptors();

    let names: Vec<&str> = descriptors.iter().map(|descriptor| descriptor.name).collect();
    assert_eq!(names, CRM_TOOL_NAMES.to_vec());
    for descriptor in &descriptors {
        assert_eq!(descriptor.input_schema["type"], json!("object"), "{}", descriptor.name);
        assert!(!descriptor.description.is_empty());
    }
    let create = &descriptors[0].input_schema;
    assert!(create["required"].as_array().is_some_and(|required| required.contains(&json!("name"))));
}

#[tokio::test]
async fn create_lead_round_trips_through_the_envelope() {
    let fixture = fixture(configured_settings());

    let result = fixture
        .registry
        .invoke("create_lead", json!({ "name": "Acme rollout", "email": "ops@acme.test" }))
        .await;

    assert_eq!(
        Envelope::from(result).to_value(),
        json!({ "success": true, "payload": { "lead_id": 1 } })
    );
    let record = fixture.connector.crm().record(LEAD_MODEL, 1).expect("record stored");
    assert_eq!(record.get("email_from"), Some(&json!("ops@acme.test")));
}

#[tokio::test]
async fn empty_name_is_invalid_input_without_remote_calls() {
    let fixture = fixture(configured_settings());

    let error = fixture.registry.invoke("create_lead", json!({ "name": "" })).await.expect_err("blank");

    assert_eq!(error.kind(), ErrorKind::InvalidInput);
    assert_eq!(fixture.connector.attempt_count(), 0);
    assert_eq!(fixture.connector.crm().total_calls(), 0);
}

#[tokio::test]
async fn malformed_lead_id_is_a_validation_error_on_that_field() {
    let fixture = fixture(configured_settings());

    let error = fixture
        .registry
        .invoke("summarize_opportunity", json!({ "lead_id": "forty-two" }))
        .await
        .expect_err("string id");

    assert!(matches!(
        error,
        OperationError::ValidationError { field: Some(ref field), .. } if field == "lead_id"
    ));
    assert_eq!(fixture.connector.attempt_count(), 0);
}

#[tokio::test]
async fn batch_ingest_fails_fast_at_position_two() {
    let fixture = fixture(configured_settings());

    let envelope = Envelope::from(
        fixture
            .registry
            .invoke(
                "ingest_prospects",
                json!({ "prospects": [{ "name": "Alpha" }, { "name": " " }, { "name": "Gamma" }] }),
            )
            .await,
    );

    assert!(!envelope.success);
    let error = envelope.error.expect("error body");
    assert_eq!(error.kind, ErrorKind::InvalidInput);
    assert!(error.message.contains("prospect 2"), "{}", error.message);
    assert_eq!(fixture.connector.crm().created_names(LEAD_MODEL), vec!["Alpha".to_string()]);
}

#[tokio::test]
async fn summary_tool_returns_the_fixed_layout() {
    let fixture = fixture(configured_settings());
    fixture.connector.crm().insert(
        LEAD_MODEL,
        42,
        json!({ "name": "Acme Deal", "probability": 75, "stage_id": [1, "Qualified"], "expected_revenue": 12000 }),
    );

    let payload = fixture
        .registry
        .invoke("summarize_opportunity", json!({ "lead_id": 42 }))
        .await
        .expect("summary");

    assert_eq!(
        payload,
        json!("Opportunity 'Acme Deal'\nStage: Qualified\nProbability: 75%\nExpected revenue: 12000")
    );
}

#[tokio::test]
async fn qualification_without_key_is_completion_unavailable() {
    let mut settings = configured_settings();
    settings.update_completion_key(None);
    let fixture = fixture(settings);

    let error =
        fixture.registry.invoke("qualify_lead", json!({ "lead_id": 42 })).await.expect_err("no key");

    assert_eq!(error.kind(), ErrorKind::CompletionUnavailable);
    assert_eq!(fixture.connector.crm().total_calls(), 0);
}

#[tokio::test]
async fn completion_key_set_at_runtime_enables_qualification() {
    let mut settings = configured_settings();
    settings.update_completion_key(None);
    let fixture = fixture(settings);
    fixture.connector.crm().insert(LEAD_MODEL, 42, json!({ "name": "Acme Deal" }));

    let before =
        fixture.registry.invoke("qualify_lead", json!({ "lead_id": 42 })).await.expect_err("no key");
    let configured = fixture
        .registry
        .invoke("configure_completion", json!({ "api_key": "sk-runtime" }))
        .await
        .expect("key stored");
    let after = fixture.registry.invoke("qualify_lead", json!({ "lead_id": 42 })).await;

    assert_eq!(before.kind(), ErrorKind::CompletionUnavailable);
    assert_eq!(configured, json!({ "completion_configured": true }));
    assert_eq!(after, Ok(json!("Interest: 64")));
}

#[tokio::test]
async fn blank_completion_key_clears_it() {
    let fixture = fixture(configured_settings());

    let cleared = fixture
        .registry
        .invoke("configure_completion", json!({ "api_key": "   " }))
        .await
        .expect("key cleared");
    let error =
        fixture.registry.invoke("qualify_lead", json!({ "lead_id": 42 })).await.expect_err("no key");

    assert_eq!(cleared, json!({ "completion_configured": false }));
    assert_eq!(error.kind(), ErrorKind::CompletionUnavailable);
}

#[tokio::test]
async fn status_and_configuration_tools_share_one_connection() {
    let fixture = fixture(Settings::default());

    let before = fixture.registry.invoke("connection_status", json!({})).await.expect("status");
    let configured = fixture
        .registry
        .invoke(
            "configure_connection",
            json!({ "url": "https://crm.example.com/", "database": "sales", "username": "bot", "password": "pw" }),
        )
        .await
        .expect("configured");
    let after = fixture.registry.invoke("connection_status", json!(null)).await.expect("status");

    assert_eq!(before, json!({ "status": "not connected" }));
    assert_eq!(configured["transport"], json!("secure"));
    assert_eq!(after, json!({ "status": "connected to crm.example.com (HTTPS)" }));
}

#[tokio::test]
async fn unknown_tool_is_reported_through_the_envelope() {
    let fixture = fixture(configured_settings());

    let envelope = Envelope::from(fixture.registry.invoke("delete_everything", json!({})).await);

    assert_eq!(
        envelope.to_value(),
        json!({
            "success": false,
            "error": { "kind": "unknown_operation", "message": "unknown operation `delete_everything`" }
        })
    );
}
