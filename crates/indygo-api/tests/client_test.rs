#![allow(clippy::unwrap_used)]
// Integration tests for `IndygoClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use indygo_api::{Error, IndygoClient, SensorCategory, SensorValue, TransportConfig};

const POOL_ID: &str = "8842";

const DEVICES_PAGE: &str = r#"
    <html><body><script>
    var currentPool = {
        "id": 8842,
        "name": "Backyard",
        "modules": [
            {"id": 1, "type": "lr-mb-10", "serialNumber": "GATEWAY123", "name": "Gateway-01"},
            {"id": 42, "type": "lr-pc", "serialNumber": "LRPC123", "name": "Filtration-R1"}
        ]
    };
    </script></body></html>
"#;

const LOGIN_PAGE: &str = r#"
    <html><body><form method="post" action="/login">
        <input name="email" type="text"/>
        <input name="password" type="password"/>
    </form></body></html>
"#;

const DASHBOARD_PAGE: &str = "<html><body>My pools</body></html>";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, IndygoClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let transport = TransportConfig {
        timeout: Duration::from_secs(5),
        ..TransportConfig::default()
    };
    let client = IndygoClient::new(
        base_url,
        "user@example.com",
        SecretString::from("test-password".to_owned()),
        POOL_ID,
        &transport,
    )
    .unwrap();
    (server, client)
}

fn status_body() -> serde_json::Value {
    json!({
        "id": 8842,
        "temperature": 27.5,
        "modules": [
            {"id": 1, "connected": true},
            {"id": 42, "connected": true, "flow": true}
        ]
    })
}

/// Mount a working login flow: GET serves the form, POST accepts anything.
async fn mount_login_success(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DASHBOARD_PAGE))
        .mount(server)
        .await;
}

async fn mount_pool_endpoints(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEVICES_PAGE))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
        .mount(server)
        .await;
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn login_succeeds_with_accepting_portal() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;

    client.ensure_session().await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_raise_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;

    // The portal answers a bad login with HTTP 200 and the form again.
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;

    let result = client.ensure_session().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn login_http_401_raises_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.ensure_session().await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn redirect_loop_terminates_within_bound() {
    let (server, client) = setup().await;

    // A portal that always redirects back to /login -- the known
    // bad-session failure mode. The transport bound must turn this into
    // an authentication error instead of hanging.
    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
        .mount(&server)
        .await;

    let result = client.ensure_session().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

// ── Fetch pipeline ──────────────────────────────────────────────────

#[tokio::test]
async fn fetch_pool_data_end_to_end() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;
    mount_pool_endpoints(&server).await;

    let data = client.fetch_pool_data().await.unwrap();

    assert_eq!(data.pool_id, POOL_ID);
    assert_eq!(data.name.as_deref(), Some("Backyard"));
    assert_eq!(data.gateway_address.as_deref(), Some("GATEWAY123"));
    assert_eq!(data.relay_id.as_deref(), Some("R1"));

    let temperature = data.sensor("temperature").unwrap();
    assert_eq!(temperature.value, SensorValue::Number(27.5));
    assert_eq!(temperature.category, SensorCategory::Measurement);

    let module = data.module("42").unwrap();
    assert_eq!(module.name, "Filtration-R1");
    let flow = module.sensors.get("flow").unwrap();
    assert_eq!(flow.value, SensorValue::Bool(true));
    assert_eq!(flow.category, SensorCategory::Diagnostic);

    // Relay id is retained for the command path.
    assert_eq!(client.relay_id().as_deref(), Some("R1"));
}

#[tokio::test]
async fn expired_session_is_retried_exactly_once() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;

    // Two logins expected: the initial one, and the re-login after the
    // portal answers the first discovery fetch with its login page.
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DASHBOARD_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEVICES_PAGE))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
        .mount(&server)
        .await;

    let data = client.fetch_pool_data().await.unwrap();
    assert_eq!(data.pool_id, POOL_ID);
}

#[tokio::test]
async fn persistent_session_rejection_becomes_authentication_error() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.fetch_pool_data().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication after the single retry, got: {result:?}"
    );
}

#[tokio::test]
async fn html_from_status_endpoint_is_upstream_format_error() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEVICES_PAGE))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/status")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client.fetch_pool_data().await;
    assert!(
        matches!(result, Err(Error::UpstreamFormat { .. })),
        "expected UpstreamFormat error, got: {result:?}"
    );
}

#[tokio::test]
async fn server_error_is_upstream_format_error() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/pools/{POOL_ID}/devices")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client.fetch_pool_data().await;
    assert!(matches!(result, Err(Error::UpstreamFormat { status: 500, .. })));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn set_filtration_mode_updates_and_syncs() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;
    mount_pool_endpoints(&server).await;

    // Learn the relay id through a normal fetch first.
    client.fetch_pool_data().await.unwrap();

    Mock::given(method("PUT"))
        .and(path("/program/update"))
        .and(body_string_contains("\"mode\":2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/remote/module/configuration/and/programs"))
        .and(body_string_contains("\"relayId\":\"R1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/module/reportModuleDataSent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/program/reportProgramsDataSent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let program = json!({
        "id": "prog_1",
        "programCharacteristics": {"mode": 0, "programType": 4}
    });

    client
        .set_filtration_mode("42", &program, indygo_api::FiltrationMode::Auto)
        .await
        .unwrap();
}

#[tokio::test]
async fn filtration_mode_survives_sync_failures() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;
    mount_pool_endpoints(&server).await;

    client.fetch_pool_data().await.unwrap();

    Mock::given(method("PUT"))
        .and(path("/program/update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    // Every sync/report call fails -- the command must still succeed
    // because the authoritative update was accepted.
    Mock::given(method("POST"))
        .and(path("/remote/module/configuration/and/programs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/module/reportModuleDataSent"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/program/reportProgramsDataSent"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let program = json!({
        "id": "prog_1",
        "programCharacteristics": {"mode": 2, "programType": 4}
    });

    client
        .set_filtration_mode("42", &program, indygo_api::FiltrationMode::Off)
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_program_update_fails_the_command() {
    let (server, client) = setup().await;
    mount_login_success(&server).await;

    Mock::given(method("PUT"))
        .and(path("/program/update"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let program = json!({
        "id": "prog_1",
        "programCharacteristics": {"mode": 0, "programType": 4}
    });

    let result = client
        .set_filtration_mode("42", &program, indygo_api::FiltrationMode::On)
        .await;
    assert!(matches!(result, Err(Error::UpstreamFormat { status: 500, .. })));
}
