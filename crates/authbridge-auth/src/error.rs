//! Error taxonomy shared by every flow
//!
//! Failures collapse into four kinds, each with a stable machine-readable code
//! that HTTP surfaces put in their response bodies:
//!
//! | Kind | Code | Raised when |
//! |------|------|-------------|
//! | [`ErrorKind::ConfigMissing`] | `config_missing` | required configuration absent or invalid, before any I/O |
//! | [`ErrorKind::NetworkFailure`] | `network_failure` | transport errors, timeouts, unexpected HTTP status |
//! | [`ErrorKind::AuthProviderError`] | `auth_provider_error` | OAuth2 error objects, WWW-Authenticate challenges, malformed provider documents |
//! | [`ErrorKind::VerificationFailure`] | `verification_failure` | missing bearer token, bad signature, audience mismatch, expiry |

use std::fmt;

use thiserror::Error;

/// Result type for authbridge operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Configuration errors, reported with the environment variable name at fault
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent or empty
    #[error("Missing required configuration: {key}")]
    Missing { key: &'static str },

    /// A key is present but unusable
    #[error("Invalid configuration for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The configuration sources could not be read
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration missing or invalid
    ConfigMissing,
    /// Network or transport failure
    NetworkFailure,
    /// Identity provider returned a protocol error
    AuthProviderError,
    /// Token verification failed
    VerificationFailure,
}

impl ErrorKind {
    /// Machine-readable code used in response bodies
    pub fn code(self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::NetworkFailure => "network_failure",
            Self::AuthProviderError => "auth_provider_error",
            Self::VerificationFailure => "verification_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Main error type for authbridge flows
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Configuration error, raised before any network call
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport failure talking to a remote endpoint
    #[error("Network failure ({endpoint}): {message}")]
    Network { endpoint: String, message: String },

    /// Identity provider or downstream API protocol error
    #[error("Provider error: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Token verification failure
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl AuthError {
    /// Create a network error for an endpoint
    pub fn network(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a provider error from an OAuth2-style error code
    pub fn provider(error: impl Into<String>) -> Self {
        Self::Provider {
            error: error.into(),
            description: None,
        }
    }

    /// Create a provider error with a description
    pub fn provider_with_description(
        error: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Provider {
            error: error.into(),
            description: Some(description.into()),
        }
    }

    /// Create a verification error
    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification(message.into())
    }

    /// The failure kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigMissing,
            Self::Network { .. } => ErrorKind::NetworkFailure,
            Self::Provider { .. } => ErrorKind::AuthProviderError,
            Self::Verification(_) => ErrorKind::VerificationFailure,
        }
    }

    /// Shortcut for `self.kind().code()`
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        let endpoint = e
            .url()
            .map(|u| u.as_str().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        Self::Network {
            endpoint,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ErrorKind::ConfigMissing.code(),
            ErrorKind::NetworkFailure.code(),
            ErrorKind::AuthProviderError.code(),
            ErrorKind::VerificationFailure.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_kind_mapping() {
        let err: AuthError = ConfigError::Missing {
            key: "SHAREPOINT_CLIENT_SECRET",
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert!(err.to_string().contains("SHAREPOINT_CLIENT_SECRET"));

        assert_eq!(
            AuthError::network("https://idp/token", "timed out").code(),
            "network_failure"
        );
        assert_eq!(
            AuthError::provider("invalid_client").code(),
            "auth_provider_error"
        );
        assert_eq!(
            AuthError::verification("audience mismatch").code(),
            "verification_failure"
        );
    }

    #[test]
    fn test_provider_display_includes_description() {
        let err = AuthError::provider_with_description("invalid_grant", "code expired");
        assert_eq!(err.to_string(), "Provider error: invalid_grant (code expired)");
        assert_eq!(
            AuthError::provider("invalid_grant").to_string(),
            "Provider error: invalid_grant"
        );
    }
}
