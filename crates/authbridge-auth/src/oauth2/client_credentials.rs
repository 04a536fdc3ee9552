//! Client credentials grant (RFC 6749 §4.4)
//!
//! Every call performs a fresh token request; tokens are never cached or
//! refreshed. The client authenticates with `client_secret_basic`.

use std::fmt;
use std::time::Duration;

use oauth2::basic::BasicClient;
use oauth2::{
    ClientId, ClientSecret, ErrorResponseType, RequestTokenError, Scope, StandardErrorResponse,
    TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info};

use crate::config::BrokerConfig;
use crate::error::{AuthError, AuthResult};
use crate::http::ProviderHttpClient;

/// Access token issued by the identity provider
///
/// The expiry is recorded but never enforced: a token lives for exactly one
/// incoming request.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    /// Lifetime reported by the provider
    pub expires_in: Option<Duration>,
    /// Granted scope, when the provider echoes it
    pub scope: Option<String>,
}

impl AccessToken {
    /// Create a token
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_in: None,
            scope: None,
        }
    }

    /// The bearer credential
    pub fn secret(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Acquires application tokens with the client credentials grant
#[derive(Clone)]
pub struct ClientCredentialsClient {
    client_id: String,
    client_secret: SecretString,
    token_url: TokenUrl,
    scope: String,
    http: ProviderHttpClient,
}

impl fmt::Debug for ClientCredentialsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsClient")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url.as_str())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsClient {
    /// Create a client for the broker's tenant token endpoint and default scope
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the derived token endpoint is not a
    /// valid URL.
    pub fn new(config: &BrokerConfig, http: ProviderHttpClient) -> AuthResult<Self> {
        let token_url = TokenUrl::new(config.token_endpoint()).map_err(|e| {
            crate::error::ConfigError::invalid("SHAREPOINT_AUTHORITY_HOST", e.to_string())
        })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url,
            scope: config.default_scope(),
            http,
        })
    }

    /// Token endpoint in use
    pub fn token_url(&self) -> &str {
        self.token_url.as_str()
    }

    /// Request a new access token
    ///
    /// # Errors
    ///
    /// - [`AuthError::Network`] on transport failure or timeout
    /// - [`AuthError::Provider`] if the provider answers with an OAuth2 error
    ///   object, a malformed response, or an empty token
    pub async fn acquire(&self) -> AuthResult<AccessToken> {
        debug!(
            token_url = %self.token_url.as_str(),
            scope = %self.scope,
            "Requesting client credentials token"
        );

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(
                self.client_secret.expose_secret().to_string(),
            ))
            .set_token_uri(self.token_url.clone());

        let response = client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| map_token_error(self.token_url.as_str(), e))?;

        let value = response.access_token().secret();
        if value.is_empty() {
            error!(token_url = %self.token_url.as_str(), "Token response carried no access token");
            return Err(AuthError::provider_with_description(
                "invalid_token_response",
                "no access token in response",
            ));
        }

        let scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        info!(
            token_url = %self.token_url.as_str(),
            expires_in = ?response.expires_in(),
            "Acquired client credentials token"
        );

        Ok(AccessToken {
            value: value.clone(),
            expires_in: response.expires_in(),
            scope,
        })
    }
}

/// Map an oauth2 request failure at `endpoint` onto the error taxonomy
pub(crate) fn map_token_error<RE, T>(
    endpoint: &str,
    err: RequestTokenError<RE, StandardErrorResponse<T>>,
) -> AuthError
where
    RE: std::error::Error + 'static,
    T: ErrorResponseType + fmt::Display,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            error!(
                endpoint = endpoint,
                error = %response.error(),
                description = ?response.error_description(),
                "OAuth2 error response"
            );
            AuthError::Provider {
                error: response.error().to_string(),
                description: response.error_description().cloned(),
            }
        }
        RequestTokenError::Request(e) => {
            error!(endpoint = endpoint, error = %e, "OAuth2 request failed");
            AuthError::network(endpoint, e)
        }
        RequestTokenError::Parse(e, _) => {
            error!(endpoint = endpoint, error = %e, "Malformed token response");
            AuthError::provider_with_description("invalid_token_response", e.to_string())
        }
        RequestTokenError::Other(message) => {
            error!(endpoint = endpoint, message = %message, "Unexpected token response");
            AuthError::provider_with_description("invalid_token_response", message)
        }
    }
}
