//! Outbound HTTP client
//!
//! One reqwest client configuration is shared by every flow: redirects are
//! never followed and each request carries the configured timeout, so a remote
//! endpoint that never answers fails the request instead of stalling it.
//!
//! The client also implements oauth2's `AsyncHttpClient`, bridging oauth2's
//! `http::Request<Vec<u8>>` to reqwest for the token-request builders.

use std::future::Future;
use std::pin::Pin;

use oauth2::AsyncHttpClient;
use oauth2::http::{self as oauth_http, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::HttpSettings;
use crate::error::{AuthError, AuthResult};

/// Request type used by oauth2
pub type HttpRequest = oauth_http::Request<Vec<u8>>;
/// Response type used by oauth2
pub type HttpResponse = oauth_http::Response<Vec<u8>>;

/// Errors raised while bridging an oauth2 request through reqwest
#[derive(Debug, Error)]
pub enum ProviderHttpError {
    /// Request execution failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Method, header or status could not be converted
    #[error("Invalid HTTP message: {0}")]
    InvalidMessage(String),
}

/// HTTP client used for every call to the identity provider and downstream API
#[derive(Clone)]
pub struct ProviderHttpClient {
    inner: reqwest::Client,
}

impl std::fmt::Debug for ProviderHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHttpClient")
            .field("inner", &"<reqwest::Client>")
            .finish()
    }
}

impl ProviderHttpClient {
    /// Create a client with redirects disabled and the configured timeout
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the TLS backend cannot be initialized.
    pub fn new(settings: &HttpSettings) -> AuthResult<Self> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(settings.timeout)
            .user_agent(concat!("authbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::network("<client>", e))?;

        Ok(Self { inner })
    }

    /// The underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.inner
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ProviderHttpError> {
        let (parts, body) = request.into_parts();

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .map_err(|_| ProviderHttpError::InvalidMessage(format!("method {}", parts.method)))?;

        let mut builder = self.inner.request(method, parts.uri.to_string());
        for (name, value) in &parts.headers {
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        let response = builder.body(body).send().await?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| ProviderHttpError::InvalidMessage(e.to_string()))?;
        let mut converted = oauth_http::Response::builder().status(status);
        for (name, value) in response.headers() {
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| ProviderHttpError::InvalidMessage(e.to_string()))?;
            converted = converted.header(name.as_str(), value);
        }

        let body = response.bytes().await?;
        converted
            .body(body.to_vec())
            .map_err(|e| ProviderHttpError::InvalidMessage(e.to_string()))
    }
}

/// Future returned by [`ProviderHttpClient`]'s oauth2 bridge
pub type ProviderHttpFuture<'c> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, ProviderHttpError>> + Send + 'c>>;

impl<'c> AsyncHttpClient<'c> for ProviderHttpClient {
    type Error = ProviderHttpError;
    type Future = ProviderHttpFuture<'c>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(self.execute(request))
    }
}
