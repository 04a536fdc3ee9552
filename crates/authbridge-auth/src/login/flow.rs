//! Login flow driver
//!
//! [`LoginFlow::run`] derives the current [`LoginState`] from the store and
//! performs that state's step. Call it again after every change (navigation,
//! sign-out request) until it settles on a login link or a profile.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AsyncHttpClient, AuthorizationCode, Client, ClientId, ClientSecret, ConfigurationError,
    EndpointNotSet, EndpointSet, ExtraTokenFields, PkceCodeVerifier, RedirectUrl,
    RequestTokenError, RevocationUrl, StandardRevocableToken, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use url::Url;

use super::state::{LoginSnapshot, LoginState};
use super::storage::{
    CODE_VERIFIER_KEY, ID_TOKEN_CLAIMS_KEY, LoginStore, StorageError, TOKEN_RESPONSE_KEY,
};
use super::{LoginError, LoginResult};
use crate::config::{LOGIN_SCOPES, LoginConfig};
use crate::discovery::{ProviderMetadata, discover};
use crate::error::{AuthError, AuthResult};
use crate::http::ProviderHttpClient;
use crate::jwt::Claims;
use crate::jwt::verifier::CLOCK_SKEW_LEEWAY;
use crate::oauth2::client_credentials::map_token_error;
use crate::oauth2::{ChallengeCheckingClient, ensure_no_challenges};
use crate::pkce;

/// Token response fields beyond RFC 6749 §5.1
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    /// ID token (compact JWT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// Token endpoint response of an OpenID Provider
pub type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// oauth2 client for the code exchange, and for revocation once the
/// revocation endpoint is set
type OidcClient<HasRevocationUrl = EndpointNotSet> = Client<
    BasicErrorResponse,
    OidcTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    HasRevocationUrl,
    EndpointSet,
>;

/// Token endpoint response, as stored between steps
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token
    pub access_token: String,
    /// Token type, `Bearer`
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// ID token (compact JWT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Refresh token, stored but never used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<&OidcTokenResponse> for TokenSet {
    fn from(response: &OidcTokenResponse) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            token_type: response.token_type().as_ref().to_string(),
            expires_in: response.expires_in().map(|lifetime| lifetime.as_secs()),
            scope: response.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            id_token: response.extra_fields().id_token.clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// User-info response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject; always equals the ID token subject
    pub sub: String,
    /// Email, when the `email` scope was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Other claims
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// What the caller should do after a [`LoginFlow::run`] step
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Show this link; the user must follow it to log in
    LoginLink(Url),
    /// Navigate to this location (the application root)
    Navigate(Url),
    /// Signed in with this profile
    SignedIn(UserInfo),
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authorization Code + PKCE login against one OpenID Provider
#[derive(Debug)]
pub struct LoginFlow<S: LoginStore> {
    config: LoginConfig,
    http: ProviderHttpClient,
    store: S,
    metadata: OnceCell<ProviderMetadata>,
    profile: Mutex<Option<UserInfo>>,
    sign_out_requested: AtomicBool,
}

impl<S: LoginStore> LoginFlow<S> {
    /// Create a flow over `store`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn new(config: LoginConfig, store: S) -> AuthResult<Self> {
        let http = ProviderHttpClient::new(&config.http)?;
        Ok(Self {
            config,
            http,
            store,
            metadata: OnceCell::new(),
            profile: Mutex::new(None),
            sign_out_requested: AtomicBool::new(false),
        })
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ask for sign-out on the next [`LoginFlow::run`]
    pub fn request_sign_out(&self) {
        self.sign_out_requested.store(true, Ordering::SeqCst);
    }

    /// Current state for a visit to `current`
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Storage`] if the store cannot be read.
    pub fn state(&self, current: &Url) -> LoginResult<LoginState> {
        let snapshot = LoginSnapshot {
            has_tokens: self.store.get(TOKEN_RESPONSE_KEY)?.is_some(),
            at_callback: current.path() == self.config.redirect_uri.path(),
            profile_loaded: self.cached_profile()?.is_some(),
            sign_out_requested: self.sign_out_requested.load(Ordering::SeqCst),
        };
        Ok(LoginState::evaluate(&snapshot))
    }

    /// Perform the step for the current state
    ///
    /// # Errors
    ///
    /// Any failure of the step; the store is left as it was before the
    /// failing request, except that sign-out always clears it.
    pub async fn run(&self, current: &Url) -> LoginResult<LoginOutcome> {
        let state = self.state(current)?;
        info!(state = %state, "Evaluating login state");

        match state {
            LoginState::NeedLogin => Ok(LoginOutcome::LoginLink(self.login_link().await?)),
            LoginState::AwaitingCallback => self.handle_callback(current).await,
            LoginState::AwaitingProfile => {
                let profile = self.load_profile().await?;
                *self.profile.lock().map_err(|_| StorageError::Poisoned)? = Some(profile.clone());
                Ok(LoginOutcome::SignedIn(profile))
            }
            LoginState::SignedIn => match self.cached_profile()? {
                Some(profile) => Ok(LoginOutcome::SignedIn(profile)),
                None => Err(StorageError::Missing("profile").into()),
            },
            LoginState::SigningOut => self.sign_out().await,
        }
    }

    fn cached_profile(&self) -> LoginResult<Option<UserInfo>> {
        Ok(self
            .profile
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .clone())
    }

    async fn metadata(&self) -> AuthResult<&ProviderMetadata> {
        self.metadata
            .get_or_try_init(|| discover(&self.config.issuer_url, &self.http))
            .await
    }

    /// Build the authorization link for a new login attempt
    ///
    /// A stored verifier is reused so the link stays valid across reloads;
    /// otherwise a new one is generated and persisted first.
    ///
    /// # Errors
    ///
    /// - [`LoginError::UnsupportedPkceMethod`] if the provider lacks S256
    /// - discovery and storage failures
    pub async fn login_link(&self) -> LoginResult<Url> {
        let verifier = match self.store.get(CODE_VERIFIER_KEY)? {
            Some(verifier) if pkce::is_valid_verifier(&verifier) => verifier,
            _ => {
                let verifier = pkce::generate_verifier();
                self.store.set(CODE_VERIFIER_KEY, &verifier)?;
                debug!("Generated new PKCE code verifier");
                verifier
            }
        };

        let metadata = self.metadata().await?;
        if !metadata.supports_pkce_method(pkce::CHALLENGE_METHOD) {
            error!(
                issuer = %metadata.issuer,
                methods = ?metadata.code_challenge_methods_supported,
                "Provider does not support S256 PKCE"
            );
            return Err(LoginError::UnsupportedPkceMethod);
        }

        let mut link = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
            AuthError::provider_with_description("invalid_discovery_document", e.to_string())
        })?;
        link.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("code_challenge", &pkce::challenge_for(&verifier))
            .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", LOGIN_SCOPES);

        Ok(link)
    }

    fn authorization_code(
        &self,
        callback: &Url,
        metadata: &ProviderMetadata,
    ) -> LoginResult<String> {
        let params: HashMap<String, String> = callback.query_pairs().into_owned().collect();

        if params.contains_key("state") {
            return Err(LoginError::invalid_callback(
                "unexpected `state` parameter, none was sent",
            ));
        }
        if let Some(iss) = params.get("iss") {
            if iss.trim_end_matches('/') != metadata.issuer.trim_end_matches('/') {
                return Err(LoginError::invalid_callback(format!(
                    "`iss` {iss} does not match {}",
                    metadata.issuer
                )));
            }
        }
        if let Some(code) = params.get("error") {
            error!(error = %code, description = ?params.get("error_description"), "Authorization failed");
            return Err(AuthError::Provider {
                error: code.clone(),
                description: params.get("error_description").cloned(),
            }
            .into());
        }

        params
            .get("code")
            .filter(|code| !code.is_empty())
            .cloned()
            .ok_or_else(|| LoginError::invalid_callback("missing `code` parameter"))
    }

    /// Exchange the authorization response in `callback` for tokens
    ///
    /// On success the token response and ID token claims are stored, the code
    /// verifier is removed, and the caller is sent to the application root.
    ///
    /// # Errors
    ///
    /// - [`LoginError::InvalidCallback`] for a `state` parameter, a foreign
    ///   `iss`, or a missing code
    /// - [`LoginError::MissingVerifier`] if no verifier is stored
    /// - [`AuthError::Provider`] for error responses and challenges
    /// - [`AuthError::Verification`] if the ID token claims are not acceptable
    pub async fn handle_callback(&self, callback: &Url) -> LoginResult<LoginOutcome> {
        let metadata = self.metadata().await?;
        let code = self.authorization_code(callback, metadata)?;
        let verifier = self
            .store
            .get(CODE_VERIFIER_KEY)?
            .ok_or(LoginError::MissingVerifier)?;

        let endpoint = metadata.token_endpoint.as_str();
        debug!(token_endpoint = endpoint, "Exchanging authorization code");

        let http = ChallengeCheckingClient::new(&self.http, endpoint);
        let response = oidc_client(&self.config, endpoint)?
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(&http)
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => e,
                other => map_token_error(endpoint, other),
            })?;

        if *response.token_type() != BasicTokenType::Bearer {
            return Err(AuthError::provider_with_description(
                "unsupported_token_type",
                response.token_type().as_ref(),
            )
            .into());
        }
        let tokens = TokenSet::from(&response);
        let id_token = tokens.id_token.as_deref().ok_or_else(|| {
            AuthError::provider_with_description("invalid_token_response", "no id_token returned")
        })?;
        let claims = Claims::decode_unverified(id_token)?;
        validate_id_token(&claims, &metadata.issuer, &self.config.client_id)?;

        self.store.set(TOKEN_RESPONSE_KEY, &to_json(&tokens)?)?;
        self.store.set(ID_TOKEN_CLAIMS_KEY, &to_json(&claims)?)?;
        self.store.remove(CODE_VERIFIER_KEY)?;

        info!(subject = ?claims.sub, "Login complete");
        Ok(LoginOutcome::Navigate(self.config.app_root.clone()))
    }

    fn stored_tokens(&self) -> LoginResult<Option<TokenSet>> {
        self.store
            .get(TOKEN_RESPONSE_KEY)?
            .map(|raw| serde_json::from_str(&raw).map_err(StorageError::from))
            .transpose()
            .map_err(LoginError::from)
    }

    /// Fetch the user profile with the stored access token
    ///
    /// # Errors
    ///
    /// - [`StorageError::Missing`] if tokens or claims are not stored
    /// - [`AuthError::Provider`] for challenges, error responses, or a
    ///   provider without a user-info endpoint
    /// - [`AuthError::Verification`] if the response subject differs from
    ///   the ID token subject
    pub async fn load_profile(&self) -> LoginResult<UserInfo> {
        let tokens = self
            .stored_tokens()?
            .ok_or(StorageError::Missing(TOKEN_RESPONSE_KEY))?;
        let claims: Claims = self
            .store
            .get(ID_TOKEN_CLAIMS_KEY)?
            .map(|raw| serde_json::from_str(&raw).map_err(StorageError::from))
            .transpose()?
            .ok_or(StorageError::Missing(ID_TOKEN_CLAIMS_KEY))?;
        let subject = claims.sub.ok_or(StorageError::Missing("sub"))?;

        let metadata = self.metadata().await?;
        let endpoint = metadata.userinfo_endpoint.as_deref().ok_or_else(|| {
            AuthError::provider_with_description(
                "invalid_discovery_document",
                "no userinfo_endpoint advertised",
            )
        })?;

        let response = self
            .http
            .client()
            .get(endpoint)
            .bearer_auth(&tokens.access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::network(endpoint, e))?;

        ensure_no_challenges(response.headers(), endpoint)?;
        let profile: UserInfo = read_json(response, endpoint).await?;

        if profile.sub != subject {
            warn!(endpoint = endpoint, "User-info subject does not match ID token");
            return Err(AuthError::verification("user-info subject does not match ID token").into());
        }

        debug!(subject = %profile.sub, "Loaded user profile");
        Ok(profile)
    }

    /// Revoke the stored access token and clear all login state
    ///
    /// Local state is cleared even when revocation fails; the revocation error
    /// is returned afterwards.
    ///
    /// # Errors
    ///
    /// Revocation, discovery, or storage failures.
    pub async fn sign_out(&self) -> LoginResult<LoginOutcome> {
        let revoked = match self.stored_tokens() {
            Ok(Some(tokens)) => self.revoke(&tokens.access_token).await,
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Stored token response unreadable, skipping revocation");
                Ok(())
            }
        };

        self.store.clear()?;
        *self.profile.lock().map_err(|_| StorageError::Poisoned)? = None;
        self.sign_out_requested.store(false, Ordering::SeqCst);
        info!("Signed out");

        revoked?;
        Ok(LoginOutcome::Navigate(self.config.app_root.clone()))
    }

    async fn revoke(&self, access_token: &str) -> LoginResult<()> {
        let metadata = self.metadata().await?;
        let Some(endpoint) = metadata.revocation_endpoint.as_deref() else {
            warn!(issuer = %metadata.issuer, "No revocation endpoint advertised, clearing local state only");
            return Ok(());
        };

        let revocation_url = RevocationUrl::new(endpoint.to_string()).map_err(|e| {
            AuthError::provider_with_description("invalid_discovery_document", e.to_string())
        })?;
        let client = oidc_client(&self.config, &metadata.token_endpoint)?
            .set_revocation_url(revocation_url);
        revoke_access_token(&client, access_token, &self.http).await?;
        Ok(())
    }
}

/// oauth2 client authenticating with `client_secret_basic` at `token_endpoint`
fn oidc_client(config: &LoginConfig, token_endpoint: &str) -> AuthResult<OidcClient> {
    let token_url = TokenUrl::new(token_endpoint.to_string()).map_err(|e| {
        AuthError::provider_with_description("invalid_discovery_document", e.to_string())
    })?;

    Ok(Client::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(
            config.client_secret.expose_secret().to_string(),
        ))
        .set_token_uri(token_url)
        .set_redirect_uri(RedirectUrl::from_url(config.redirect_uri.clone())))
}

/// Revoke `access_token` (RFC 7009)
///
/// Revocation endpoints must be HTTPS. A plain-HTTP endpoint is never sent
/// the token; local state is cleared without revoking, as for a provider that
/// advertises no endpoint.
async fn revoke_access_token<'c, C>(
    client: &'c OidcClient<EndpointSet>,
    access_token: &str,
    http: &'c C,
) -> AuthResult<()>
where
    C: AsyncHttpClient<'c>,
{
    let endpoint = client.revocation_url().as_str();
    let token = oauth2::AccessToken::new(access_token.to_string());
    let request = match client.revoke_token(StandardRevocableToken::from(token)) {
        Ok(request) => request,
        Err(ConfigurationError::InsecureUrl(_)) => {
            warn!(endpoint = endpoint, "Revocation endpoint is not HTTPS, clearing local state only");
            return Ok(());
        }
        Err(e) => {
            return Err(AuthError::provider_with_description(
                "invalid_discovery_document",
                e.to_string(),
            ));
        }
    };

    request
        .request_async(http)
        .await
        .map_err(|e| map_token_error(endpoint, e))?;
    debug!(endpoint = endpoint, "Access token revoked");
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

fn error_from_body(body: &[u8], status: reqwest::StatusCode, endpoint: &str) -> AuthError {
    match serde_json::from_slice::<OAuthErrorBody>(body) {
        Ok(err) => {
            error!(endpoint = endpoint, error = %err.error, description = ?err.error_description, "OAuth2 error response");
            AuthError::Provider {
                error: err.error,
                description: err.error_description,
            }
        }
        Err(_) => {
            error!(endpoint = endpoint, status = %status, "Unexpected status");
            AuthError::network(endpoint, format!("unexpected status {status}"))
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, endpoint: &str) -> AuthResult<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| AuthError::network(endpoint, e))?;

    if !status.is_success() {
        return Err(error_from_body(&body, status, endpoint));
    }

    serde_json::from_slice(&body).map_err(|e| {
        error!(endpoint = endpoint, error = %e, "Malformed response body");
        AuthError::provider_with_description("invalid_response", e.to_string())
    })
}

/// Check `iss`, `aud`, `exp` and `sub` of freshly issued ID token claims
fn validate_id_token(claims: &Claims, issuer: &str, client_id: &str) -> AuthResult<()> {
    let iss = claims.iss.as_deref().unwrap_or_default();
    if iss.trim_end_matches('/') != issuer.trim_end_matches('/') {
        return Err(AuthError::verification(format!(
            "ID token issuer `{iss}` does not match `{issuer}`"
        )));
    }

    if !claims.aud.as_ref().is_some_and(|aud| aud.contains(client_id)) {
        return Err(AuthError::verification(
            "ID token audience does not contain the client id",
        ));
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    match claims.exp {
        Some(exp) if exp.saturating_add(CLOCK_SKEW_LEEWAY.as_secs()) >= now => {}
        Some(_) => return Err(AuthError::verification("ID token expired")),
        None => return Err(AuthError::verification("ID token has no exp claim")),
    }

    if claims.sub.as_deref().is_none_or(str::is_empty) {
        return Err(AuthError::verification("ID token has no subject"));
    }

    Ok(())
}
