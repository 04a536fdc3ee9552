//! OpenID Provider discovery (OpenID Connect Discovery 1.0)
//!
//! Metadata is fetched from `{issuer}/.well-known/openid-configuration` and
//! rejected unless its `issuer` names the provider it was fetched from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::http::ProviderHttpClient;

/// PKCE method the login flow requires
pub const PKCE_METHOD_S256: &str = "S256";

/// OpenID Provider metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier
    pub issuer: String,

    /// Authorization endpoint
    pub authorization_endpoint: String,

    /// Token endpoint
    pub token_endpoint: String,

    /// User-info endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// Token revocation endpoint (RFC 7009)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// Key set location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported PKCE challenge methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Supported scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Everything else the provider advertises
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl ProviderMetadata {
    /// Whether `method` is an advertised PKCE challenge method
    ///
    /// Absence of `code_challenge_methods_supported` counts as no support.
    pub fn supports_pkce_method(&self, method: &str) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }
}

/// Discovery document location for `issuer`
pub fn discovery_url(issuer: &Url) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.as_str().trim_end_matches('/')
    )
}

/// Fetch and validate provider metadata
///
/// # Errors
///
/// - [`AuthError::Network`] on transport failure or a non-success status
/// - [`AuthError::Provider`] if the document is malformed or its `issuer`
///   differs from `issuer`
pub async fn discover(issuer: &Url, http: &ProviderHttpClient) -> AuthResult<ProviderMetadata> {
    let url = discovery_url(issuer);
    debug!(url = %url, "Fetching OpenID Provider metadata");

    let response = http
        .client()
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::network(&url, e))?;

    let status = response.status();
    if !status.is_success() {
        error!(url = %url, status = %status, "Discovery endpoint returned error status");
        return Err(AuthError::network(&url, format!("unexpected status {status}")));
    }

    let metadata: ProviderMetadata = response.json().await.map_err(|e| {
        error!(url = %url, error = %e, "Malformed discovery document");
        AuthError::provider_with_description("invalid_discovery_document", e.to_string())
    })?;

    let expected = issuer.as_str().trim_end_matches('/');
    if metadata.issuer.trim_end_matches('/') != expected {
        error!(expected = expected, actual = %metadata.issuer, "Discovery issuer mismatch");
        return Err(AuthError::provider_with_description(
            "invalid_issuer",
            format!(
                "document issuer {} does not match {expected}",
                metadata.issuer
            ),
        ));
    }

    debug!(
        issuer = %metadata.issuer,
        pkce_s256 = metadata.supports_pkce_method(PKCE_METHOD_S256),
        "Discovered OpenID Provider"
    );
    Ok(metadata)
}
