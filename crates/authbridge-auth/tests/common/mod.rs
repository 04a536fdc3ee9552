//! Common test utilities for integration tests
//!
//! A wiremock-backed identity provider plus signing helpers for the RSA keys
//! in `tests/fixtures`.

#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIMARY_PEM: &[u8] = include_bytes!("../fixtures/primary_rsa.pem");
pub const SECONDARY_PEM: &[u8] = include_bytes!("../fixtures/secondary_rsa.pem");

pub const PRIMARY_N: &str = "woXl5MdITJAoS2ZGZ72sJuPVq46vY2mUNwKB1VQeSqowtLVNNaHzaH9VBN8DuMG8Zmcp6I3wl6Tv7-dgDq2wADTcfcmQtJkh7bTELeJen_wv8mjNWHkPtDlXJsgTuCXADUOKSN5LWihwLsMn5Zarby9gQfoS7C0M0asKHaVb6D5Xl7bjbxb-EdNYC_T7xuGE_lhKQBlt9pYzIP0Y9EUB_dfFG4ld0n804dlL-mMI8oecZsm01_CPDiIvEOEBGbbCFAbAW6CXdz85HVtOHV6iL6mTkw62q9UvZEt9O5h_sX5BMNah6R65Nveg9J5-vbq_gx3gRYB1CchHOmMAt7RTHw";
pub const SECONDARY_N: &str = "rBqxZKxdSvjZXIPcs9qosGm1Bn_sH2cq3gfP8OzUAjd-UFeqxQTiaH18_QHTrT07UJtE1uQ9CcAiTgJxXY-xvxcrVGcWNwpmbzBN1XHSeJFPHGF3rzKo6lYbyQ2bcyg7bdbuU0rvyhvtyHi7SnJmvWPtOhC3jAYpxYD-AHq0IabWwL4pJ55JGTM-cb6QmJpkXYIarKmXEyww6nvcxjXoq1c0pVfDozkScZxB86DofZPD1lwFlgVOFTMpIcZDiefWBPfTKeS0hIoVSjAHQcAxd3oOKo9mf55Mfo5KFezv7RNH7_qy8yzXgJjuZLBBD-0z1VmqKf3bfSSiRYBUyoLYow";

pub const PRIMARY_KID: &str = "primary";
pub const SECONDARY_KID: &str = "secondary";

/// Current Unix time in seconds
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Public JWK for one of the fixture keys
pub fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({
        "kty": "RSA",
        "use": "sig",
        "alg": "RS256",
        "kid": kid,
        "n": n,
        "e": "AQAB"
    })
}

/// Both fixture keys, primary first
pub fn fixture_key_set() -> Value {
    json!({
        "keys": [
            rsa_jwk(PRIMARY_KID, PRIMARY_N),
            rsa_jwk(SECONDARY_KID, SECONDARY_N)
        ]
    })
}

/// Sign `claims` with an RS256 fixture key
pub fn sign(claims: &Value, private_key: &[u8], kid: Option<&str>) -> String {
    let key = EncodingKey::from_rsa_pem(private_key).expect("Invalid RSA key");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &key).expect("Failed to encode test JWT")
}

/// Access token claims for `audience`, valid for five minutes
pub fn access_claims(audience: &str) -> Value {
    json!({
        "iss": "https://idp.example.com",
        "sub": "user-1",
        "aud": audience,
        "iat": now(),
        "exp": now() + 300
    })
}

/// Mock OpenID Provider with discovery, JWKS, token, user-info and revocation endpoints
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn url(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.server.uri())
    }

    /// Discovery document, with `overrides` merged over the defaults
    pub fn discovery_document(&self, overrides: Value) -> Value {
        let mut document = json!({
            "issuer": self.issuer(),
            "authorization_endpoint": self.url("/authorize"),
            "token_endpoint": self.url("/token"),
            "userinfo_endpoint": self.url("/userinfo"),
            "revocation_endpoint": self.url("/revoke"),
            "jwks_uri": self.url("/.well-known/jwks.json"),
            "code_challenge_methods_supported": ["S256"],
            "response_types_supported": ["code"]
        });
        if let (Some(base), Some(extra)) = (document.as_object_mut(), overrides.as_object()) {
            for (key, value) in extra {
                if value.is_null() {
                    base.remove(key);
                } else {
                    base.insert(key.clone(), value.clone());
                }
            }
        }
        document
    }

    pub async fn mock_discovery(&self, overrides: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_document(overrides)))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_jwks(&self, key_set: Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set))
            .mount(&self.server)
            .await;
    }

    /// ID token for `client_id` issued by this provider
    pub fn id_token(&self, client_id: &str, sub: &str) -> String {
        sign(
            &json!({
                "iss": self.issuer(),
                "sub": sub,
                "aud": client_id,
                "email": "user@example.com",
                "iat": now(),
                "exp": now() + 300
            }),
            PRIMARY_PEM,
            Some(PRIMARY_KID),
        )
    }

    /// Token response carrying an access token and an ID token
    pub fn token_response(&self, client_id: &str, sub: &str) -> Value {
        json!({
            "access_token": "user-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid email",
            "id_token": self.id_token(client_id, sub)
        })
    }
}
