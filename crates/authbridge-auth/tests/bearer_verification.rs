//! Bearer verification against a mocked JWKS endpoint

mod common;

use authbridge_auth::config::{HttpSettings, KeySelection, Settings, VerifierConfig};
use authbridge_auth::http::ProviderHttpClient;
use authbridge_auth::jwt::{BearerVerifier, JwksFetcher};
use authbridge_auth::{AuthError, ErrorKind};
use common::*;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

const AUDIENCE: &str = "http://localhost:5500";

fn verifier(idp: &MockIdentityProvider, key_selection: KeySelection) -> BearerVerifier {
    let fetcher = JwksFetcher::new(
        idp.url("/.well-known/jwks.json").parse().unwrap(),
        ProviderHttpClient::new(&HttpSettings::default()).unwrap(),
    );
    BearerVerifier::with_fetcher(fetcher, AUDIENCE, key_selection)
}

#[tokio::test]
async fn test_valid_token_is_verified() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    let token = sign(&access_claims(AUDIENCE), PRIMARY_PEM, Some(PRIMARY_KID));
    let header = format!("Bearer {token}");

    let verified = verifier(&idp, KeySelection::KeyId)
        .verify_request(Some(&header))
        .await
        .unwrap();
    assert_eq!(verified.claims.sub.as_deref(), Some("user-1"));
    assert_eq!(verified.key_id.as_deref(), Some(PRIMARY_KID));
}

#[tokio::test]
async fn test_verifier_built_from_config() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    let settings = Settings::from_vars([("ISSUER_URL", idp.issuer())]).unwrap();
    let config = VerifierConfig::from_settings(&settings, 5500).unwrap();
    let verifier = BearerVerifier::new(&config).unwrap();

    let token = sign(&access_claims(AUDIENCE), PRIMARY_PEM, Some(PRIMARY_KID));
    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_missing_header_is_verification_failure() {
    let idp = MockIdentityProvider::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture_key_set()))
        .expect(0)
        .mount(&idp.server)
        .await;

    let err = verifier(&idp, KeySelection::KeyId)
        .verify_request(None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);
}

#[tokio::test]
async fn test_wrong_audience_is_rejected() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    let token = sign(
        &access_claims("http://localhost:9999"),
        PRIMARY_PEM,
        Some(PRIMARY_KID),
    );
    let err = verifier(&idp, KeySelection::KeyId)
        .verify(&token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Verification(_)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    let mut claims = access_claims(AUDIENCE);
    claims["exp"] = json!(now() - 3600);
    let token = sign(&claims, PRIMARY_PEM, Some(PRIMARY_KID));

    let err = verifier(&idp, KeySelection::KeyId)
        .verify(&token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);
}

#[tokio::test]
async fn test_first_key_policy_rejects_token_from_second_key() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    let token = sign(&access_claims(AUDIENCE), SECONDARY_PEM, Some(SECONDARY_KID));

    let err = verifier(&idp, KeySelection::FirstKey)
        .verify(&token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationFailure);

    // Matching by kid accepts the same token
    assert!(verifier(&idp, KeySelection::KeyId).verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_unknown_kid_is_rejected() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(json!({"keys": [rsa_jwk(PRIMARY_KID, PRIMARY_N)]}))
        .await;

    let token = sign(&access_claims(AUDIENCE), SECONDARY_PEM, Some(SECONDARY_KID));
    let err = verifier(&idp, KeySelection::KeyId)
        .verify(&token)
        .await
        .unwrap_err();
    assert!(err.to_string().contains(SECONDARY_KID));
}

#[tokio::test]
async fn test_keys_are_fetched_on_every_request() {
    let idp = MockIdentityProvider::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture_key_set()))
        .expect(3)
        .mount(&idp.server)
        .await;

    let verifier = verifier(&idp, KeySelection::KeyId);
    let token = sign(&access_claims(AUDIENCE), PRIMARY_PEM, Some(PRIMARY_KID));
    for _ in 0..3 {
        verifier.verify(&token).await.unwrap();
    }
}

#[tokio::test]
async fn test_unreachable_jwks_is_network_failure() {
    let idp = MockIdentityProvider::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&idp.server)
        .await;

    let token = sign(&access_claims(AUDIENCE), PRIMARY_PEM, Some(PRIMARY_KID));
    let err = verifier(&idp, KeySelection::KeyId)
        .verify(&token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}

#[tokio::test]
async fn test_garbage_token_never_panics() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks(fixture_key_set()).await;

    for header in ["Bearer", "Bearer not.a.jwt", "Bearer ....", "Bearer e30.e30.e30"] {
        let err = verifier(&idp, KeySelection::KeyId)
            .verify_request(Some(header))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VerificationFailure, "{header}");
    }
}
