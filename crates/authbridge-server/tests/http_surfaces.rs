//! Verifier and broker routers driven with `oneshot`

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use authbridge_auth::config::{BrokerConfig, BrokerMode, KeySelection, Settings, VerifierConfig};
use authbridge_auth::{BearerVerifier, TokenBroker};
use authbridge_server::{broker, verifier};
use axum::Router;
use axum::body::{Body, to_bytes};
use http::Request;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &[u8] = b"authbridge-server-test-signing-secret";
const SECRET_B64URL: &str = "YXV0aGJyaWRnZS1zZXJ2ZXItdGVzdC1zaWduaW5nLXNlY3JldA";
const AUDIENCE: &str = "http://localhost:5500";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn token(audience: &str) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("shared".into());
    let claims = json!({"sub": "user-1", "aud": audience, "exp": now() + 300});
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn get(app: Router, authorization: Option<&str>) -> Value {
    let mut request = Request::builder().uri("/");
    if let Some(value) = authorization {
        request = request.header("authorization", value);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn verifier_app(server: &MockServer) -> Router {
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{"kty": "oct", "alg": "HS256", "kid": "shared", "k": SECRET_B64URL}]
        })))
        .mount(server)
        .await;

    let settings = Settings::from_vars([("ISSUER_URL", server.uri())]).unwrap();
    let config = VerifierConfig::from_settings(&settings, 5500).unwrap();
    assert_eq!(config.key_selection, KeySelection::KeyId);
    verifier::router(Arc::new(BearerVerifier::new(&config).unwrap()))
}

#[tokio::test]
async fn test_verifier_accepts_valid_token() {
    let server = MockServer::start().await;
    let app = verifier_app(&server).await;

    let header = format!("Bearer {}", token(AUDIENCE));
    assert_eq!(get(app, Some(&header)).await, json!({"status": "verified"}));
}

#[tokio::test]
async fn test_verifier_missing_header() {
    let server = MockServer::start().await;
    let app = verifier_app(&server).await;

    assert_eq!(
        get(app, None).await,
        json!({"status": "error", "code": "verification_failure"})
    );
}

#[tokio::test]
async fn test_verifier_wrong_audience() {
    let server = MockServer::start().await;
    let app = verifier_app(&server).await;

    let header = format!("Bearer {}", token("http://localhost:1234"));
    assert_eq!(
        get(app, Some(&header)).await,
        json!({"status": "error", "code": "verification_failure"})
    );
}

#[tokio::test]
async fn test_verifier_jwks_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let settings = Settings::from_vars([("ISSUER_URL", server.uri())]).unwrap();
    let config = VerifierConfig::from_settings(&settings, 5500).unwrap();
    let app = verifier::router(Arc::new(BearerVerifier::new(&config).unwrap()));

    let header = format!("Bearer {}", token(AUDIENCE));
    assert_eq!(
        get(app, Some(&header)).await,
        json!({"status": "error", "code": "network_failure"})
    );
}

fn broker_app(server: &MockServer, mode: BrokerMode) -> Router {
    let settings = Settings::from_vars([
        ("SHAREPOINT_CLIENT_ID", "client-123".to_string()),
        ("SHAREPOINT_CLIENT_SECRET", "s3cret".to_string()),
        ("SHAREPOINT_TENANT_ID", "tenant-abc".to_string()),
        ("SHAREPOINT_SITE_ID", "site-1".to_string()),
        ("SHAREPOINT_AUTHORITY_HOST", server.uri()),
        ("SHAREPOINT_GRAPH_BASE_URL", server.uri()),
    ])
    .unwrap();
    let config = BrokerConfig::from_settings(&settings, mode).unwrap();
    broker::router(Arc::new(TokenBroker::new(&config, mode).unwrap()))
}

async fn mock_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/tenant-abc/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "app-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_broker_token_mode() {
    let server = MockServer::start().await;
    mock_token(&server).await;

    let app = broker_app(&server, BrokerMode::Token);
    assert_eq!(get(app, None).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_broker_site_mode() {
    let server = MockServer::start().await;
    mock_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "site-1",
            "webUrl": "https://contoso.sharepoint.com/sites/projects"
        })))
        .mount(&server)
        .await;

    let app = broker_app(&server, BrokerMode::Site);
    assert_eq!(
        get(app, None).await,
        json!({
            "accessToken": "app-token",
            "id": "site-1",
            "webUrl": "https://contoso.sharepoint.com/sites/projects"
        })
    );
}

#[tokio::test]
async fn test_broker_error_names_step() {
    let server = MockServer::start().await;
    mock_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "itemNotFound", "message": "Requested site could not be found"}
        })))
        .mount(&server)
        .await;

    let app = broker_app(&server, BrokerMode::Site);
    assert_eq!(
        get(app, None).await,
        json!({"status": "error", "code": "auth_provider_error", "step": "site"})
    );
}

#[tokio::test]
async fn test_broker_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let app = broker_app(&server, BrokerMode::Token);
    let body = get(app, None).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["step"], "token");
}
