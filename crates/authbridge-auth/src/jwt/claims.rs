//! Registered JWT claims (RFC 7519)

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// `aud` may be a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    Single(String),
    /// Multiple audiences
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `value` is one of the audiences
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(aud) => aud == value,
            Self::Multiple(auds) => auds.iter().any(|a| a == value),
        }
    }
}

/// Registered claims plus everything else the issuer put in the token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,

    /// Not before (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,

    /// Issued at (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Email, present when the `email` scope was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Additional claims
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Decode the payload segment of a compact JWT without checking its signature
    ///
    /// Only for tokens received directly from the token endpoint over TLS.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Provider`] if the token is not three segments of
    /// base64url-encoded JSON.
    pub fn decode_unverified(token: &str) -> AuthResult<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::provider_with_description(
                "invalid_id_token",
                "expected three dot-separated segments",
            ));
        }

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
            AuthError::provider_with_description("invalid_id_token", e.to_string())
        })?;

        serde_json::from_slice(&payload)
            .map_err(|e| AuthError::provider_with_description("invalid_id_token", e.to_string()))
    }
}
