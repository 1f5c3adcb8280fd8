// Integration tests for `OdooConnector` and `OdooSession` using wiremock.

use std::time::Duration;

use leadbridge_core::connection::{CrmConnector, CrmSession, Endpoint, RpcError, Transport};
use leadbridge_core::domain::{FieldMap, LeadId};
use leadbridge_core::settings::CrmCredentials;
use leadbridge_crm::OdooConnector;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> Endpoint {
    Endpoint { transport: Transport::Plaintext, host: "127.0.0.1".to_string(), port: server.address().port() }
}

fn credentials() -> CrmCredentials {
    CrmCredentials {
        remote_address: "127.0.0.1".to_string(),
        tenant: "sales".to_string(),
        username: "bot@example.com".to_string(),
        secret: "pw".to_string().into(),
    }
}

fn connector() -> OdooConnector {
    OdooConnector::new(Duration::from_secs(5)).expect("http client")
}

async fn mount_login(server: &MockServer, uid: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "method": "call",
            "params": { "service": "common", "method": "login", "args": ["sales", "bot@example.com", "pw"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": "1", "result": uid })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_then_create_sends_execute_kw() {
    let server = MockServer::start().await;
    mount_login(&server, json!(7)).await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "params": {
                "service": "object",
                "method": "execute_kw",
                "args": ["sales", 7, "pw", "crm.lead", "create", [{ "name": "Acme" }], {}]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": "2", "result": 91 })))
        .expect(1)
        .mount(&server)
        .await;

    let session = connector().login(&endpoint(&server), &credentials()).await.expect("login");
    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), json!("Acme"));
    let id = session.create("crm.lead", fields).await.expect("create");

    assert_eq!(id, LeadId::from(91_i64));
}

#[tokio::test]
async fn false_uid_is_an_authentication_failure() {
    let server = MockServer::start().await;
    mount_login(&server, json!(false)).await;

    let result = connector().login(&endpoint(&server), &credentials()).await;

    assert!(
        matches!(result, Err(RpcError::Authentication(_))),
        "expected authentication error, got: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn rpc_fault_surfaces_the_server_message() {
    let server = MockServer::start().await;
    mount_login(&server, json!(7)).await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({ "params": { "service": "object" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "3",
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": { "name": "odoo.exceptions.AccessError", "message": "You are not allowed to access 'Lead'" }
            }
        })))
        .mount(&server)
        .await;

    let session = connector().login(&endpoint(&server), &credentials()).await.expect("login");
    let error = session.search_count("crm.lead", json!([])).await.expect_err("access error");

    assert_eq!(error, RpcError::Remote("You are not allowed to access 'Lead'".to_string()));
}

#[tokio::test]
async fn read_and_search_read_pass_fields_and_limit() {
    let server = MockServer::start().await;
    mount_login(&server, json!(7)).await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "params": { "args": ["sales", 7, "pw", "crm.lead", "read", [[42]], { "fields": ["name", "stage_id"] }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "4",
            "result": [{ "id": 42, "name": "Acme Deal", "stage_id": [3, "Qualified"] }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(body_partial_json(json!({
            "params": { "args": ["sales", 7, "pw", "crm.lead", "search_read", [[]], { "fields": ["name"], "limit": 5 }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "5",
            "result": [{ "id": 1, "name": "One" }, { "id": 2, "name": "Two" }]
        })))
        .mount(&server)
        .await;

    let session = connector().login(&endpoint(&server), &credentials()).await.expect("login");
    let read = session
        .read("crm.lead", &[LeadId::from(42_i64)], &["name", "stage_id"])
        .await
        .expect("read");
    let listed = session.search_read("crm.lead", json!([]), &["name"], Some(5)).await.expect("search_read");

    assert_eq!(read.len(), 1);
    assert_eq!(read[0].get("name"), Some(&json!("Acme Deal")));
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn http_errors_keep_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let result = connector().login(&endpoint(&server), &credentials()).await;

    assert!(
        matches!(result, Err(RpcError::Status { status: 502, ref body }) if body == "Bad Gateway"),
        "expected status error, got: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn unreachable_host_is_a_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind unused port");
    let port = listener.local_addr().expect("unused port address").port();
    drop(listener);
    let endpoint = Endpoint { transport: Transport::Plaintext, host: "127.0.0.1".to_string(), port };

    let result = connector().login(&endpoint, &credentials()).await;

    assert!(
        matches!(result, Err(RpcError::Transport(_))),
        "expected transport error, got: {:?}",
        result.err()
    );
}
