//! JWKS (JSON Web Key Set) fetching
//!
//! Every verification fetches the key set again: there is no cache, so a key
//! rotated at the issuer is picked up on the very next request.

use jsonwebtoken::jwk::JwkSet;
use tracing::{debug, error};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::http::ProviderHttpClient;

/// Fetches the issuer's published signing keys
///
/// # Example
///
/// ```rust,no_run
/// # use authbridge_auth::{config::HttpSettings, http::ProviderHttpClient, jwt::JwksFetcher};
/// # tokio_test::block_on(async {
/// let http = ProviderHttpClient::new(&HttpSettings::default())?;
/// let fetcher = JwksFetcher::new(
///     "https://idp.example.com/.well-known/jwks.json".parse()?,
///     http,
/// );
///
/// let jwks = fetcher.fetch().await?;
/// println!("{} keys published", jwks.keys.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct JwksFetcher {
    jwks_uri: Url,
    http: ProviderHttpClient,
}

impl JwksFetcher {
    /// Create a fetcher for `jwks_uri`
    pub fn new(jwks_uri: Url, http: ProviderHttpClient) -> Self {
        Self { jwks_uri, http }
    }

    /// The key set location
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    /// Fetch and parse the key set
    ///
    /// # Errors
    ///
    /// - [`AuthError::Network`] if the endpoint is unreachable, times out, or
    ///   answers with a non-success status
    /// - [`AuthError::Provider`] if the body is not a JWK Set
    pub async fn fetch(&self) -> AuthResult<JwkSet> {
        debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");

        let response = self
            .http
            .client()
            .get(self.jwks_uri.clone())
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch JWKS");
                AuthError::network(self.jwks_uri.as_str(), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_uri = %self.jwks_uri, status = %status, "JWKS endpoint returned error status");
            return Err(AuthError::network(
                self.jwks_uri.as_str(),
                format!("unexpected status {status}"),
            ));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to parse JWKS JSON");
            AuthError::provider_with_description("invalid_jwks", e.to_string())
        })?;

        debug!(jwks_uri = %self.jwks_uri, key_count = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }
}
