//! Bearer token verification
//!
//! Verifies a token against the issuer's key set:
//! - Bearer extraction that never panics on absent or malformed headers
//! - Key selection by policy (first key, or `kid` match)
//! - Signature verification with the key's algorithm
//! - Audience check against this service's own base URL
//! - Expiry check
//!
//! The issuer claim is not checked; trust comes from the key set location.

use std::time::Duration;

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};
use tracing::{debug, warn};

use super::{Claims, JwksFetcher};
use crate::config::{KeySelection, VerifierConfig};
use crate::error::{AuthError, AuthResult};
use crate::http::ProviderHttpClient;

/// Tolerated clock difference for `exp` and `nbf`
pub const CLOCK_SKEW_LEEWAY: Duration = Duration::from_secs(60);

/// Extract the token from an `Authorization: Bearer <token>` header value
///
/// The scheme is matched case-insensitively. Absence, another scheme, an empty
/// token, or a token containing whitespace all yield
/// [`AuthError::Verification`].
///
/// # Example
///
/// ```rust
/// use authbridge_auth::jwt::extract_bearer;
///
/// assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
/// assert!(extract_bearer(None).is_err());
/// assert!(extract_bearer(Some("Basic dXNlcjpwYXNz")).is_err());
/// ```
pub fn extract_bearer(header: Option<&str>) -> AuthResult<&str> {
    let value = header.ok_or_else(|| AuthError::verification("missing Authorization header"))?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::verification("malformed Authorization header"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::verification("Authorization scheme is not Bearer"));
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::verification("malformed bearer token"));
    }

    Ok(token)
}

/// A token that passed verification
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Decoded claims
    pub claims: Claims,
    /// Algorithm the signature was checked with
    pub algorithm: Algorithm,
    /// `kid` of the key that verified the token, if the key carried one
    pub key_id: Option<String>,
}

/// Verifies bearer tokens against a freshly fetched key set
#[derive(Debug, Clone)]
pub struct BearerVerifier {
    jwks: JwksFetcher,
    audience: String,
    key_selection: KeySelection,
}

impl BearerVerifier {
    /// Build a verifier from validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &VerifierConfig) -> AuthResult<Self> {
        let http = ProviderHttpClient::new(&config.http)?;
        Ok(Self::with_fetcher(
            JwksFetcher::new(config.jwks_uri.clone(), http),
            config.audience.clone(),
            config.key_selection,
        ))
    }

    /// Build a verifier around an existing fetcher
    pub fn with_fetcher(
        jwks: JwksFetcher,
        audience: impl Into<String>,
        key_selection: KeySelection,
    ) -> Self {
        Self {
            jwks,
            audience: audience.into(),
            key_selection,
        }
    }

    /// Expected audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Active key selection policy
    pub fn key_selection(&self) -> KeySelection {
        self.key_selection
    }

    /// Extract the bearer token from a header value and verify it
    ///
    /// # Errors
    ///
    /// Any failure from [`extract_bearer`] or [`BearerVerifier::verify`].
    pub async fn verify_request(&self, authorization: Option<&str>) -> AuthResult<VerifiedToken> {
        let token = extract_bearer(authorization)?;
        self.verify(token).await
    }

    /// Verify a compact JWT
    ///
    /// # Errors
    ///
    /// - [`AuthError::Verification`] for malformed tokens, no usable key,
    ///   signature mismatch, wrong audience, or expiry
    /// - [`AuthError::Network`] / [`AuthError::Provider`] if the key set
    ///   cannot be fetched
    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "Failed to decode JWT header");
            AuthError::verification(format!("invalid JWT header: {e}"))
        })?;

        let jwks = self.jwks.fetch().await?;
        let jwk = select_key(&jwks, self.key_selection, header.kid.as_deref())?;
        let algorithm = resolve_algorithm(jwk, &header)?;

        let key = DecodingKey::from_jwk(jwk).map_err(|e| {
            warn!(key_id = ?jwk.common.key_id, error = %e, "Unusable JWK");
            AuthError::verification(format!("unusable JWK: {e}"))
        })?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.audience]);
        validation.leeway = CLOCK_SKEW_LEEWAY.as_secs();

        let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            warn!(
                error = %e,
                audience = %self.audience,
                key_selection = ?self.key_selection,
                "JWT verification failed"
            );
            AuthError::verification(e.to_string())
        })?;

        debug!(
            subject = ?data.claims.sub,
            algorithm = ?algorithm,
            key_id = ?jwk.common.key_id,
            "JWT verified"
        );

        Ok(VerifiedToken {
            claims: data.claims,
            algorithm,
            key_id: jwk.common.key_id.clone(),
        })
    }
}

fn select_key<'a>(
    jwks: &'a JwkSet,
    policy: KeySelection,
    kid: Option<&str>,
) -> AuthResult<&'a Jwk> {
    let found = match (policy, kid) {
        (KeySelection::KeyId, Some(kid)) => jwks.find(kid),
        _ => jwks.keys.first(),
    };

    found.ok_or_else(|| match kid {
        Some(kid) if policy == KeySelection::KeyId => {
            warn!(key_id = kid, "Key ID not found in JWKS");
            AuthError::verification(format!("no key with kid `{kid}` in key set"))
        }
        _ => AuthError::verification("key set is empty"),
    })
}

fn resolve_algorithm(jwk: &Jwk, header: &Header) -> AuthResult<Algorithm> {
    if let Some(key_alg) = jwk.common.key_algorithm {
        return signing_algorithm(key_alg).ok_or_else(|| {
            AuthError::verification(format!("key algorithm {key_alg:?} cannot verify signatures"))
        });
    }

    match header.alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Err(AuthError::verification(
            "key has no algorithm and token requests a symmetric one",
        )),
        alg => Ok(alg),
    }
}

/// Signature algorithm named by a JWK `alg`; `None` for encryption algorithms
fn signing_algorithm(key_alg: KeyAlgorithm) -> Option<Algorithm> {
    match key_alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        KeyAlgorithm::RSA1_5
        | KeyAlgorithm::RSA_OAEP
        | KeyAlgorithm::RSA_OAEP_256
        | KeyAlgorithm::UNKNOWN_ALGORITHM => None,
    }
}
