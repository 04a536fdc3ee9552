//! Service-to-service token broker
//!
//! Each call to [`TokenBroker::handle`] acquires a fresh application token and,
//! depending on the [`BrokerMode`], chains downstream calls with it:
//!
//! | Mode | Steps | Reply |
//! |------|-------|-------|
//! | `token` | token | `{"status":"ok"}` |
//! | `site` | token, site | `{"accessToken": ..., ...site}` |
//! | `project` | token, site, list | `{"projectId": ...}` |
//!
//! A failure is tagged with the step it happened in. Nothing is cached between
//! calls.

use std::fmt;

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BrokerConfig, BrokerMode, SiteTarget};
use crate::error::{AuthError, AuthResult, ConfigError, ErrorKind};
use crate::graph::GraphClient;
use crate::http::ProviderHttpClient;
use crate::oauth2::{AccessToken, ClientCredentialsClient};

/// Stage of a broker request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerStep {
    /// Client credentials token acquisition
    Token,
    /// Site lookup
    Site,
    /// List lookup by display name
    List,
}

impl BrokerStep {
    /// Name used in error bodies
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Site => "site",
            Self::List => "list",
        }
    }
}

impl fmt::Display for BrokerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broker request that failed at `step`
#[derive(Debug, Error)]
#[error("{step} step failed: {source}")]
pub struct BrokerError {
    /// Where the request failed
    pub step: BrokerStep,
    /// Underlying failure
    #[source]
    pub source: AuthError,
}

impl BrokerError {
    /// Failure kind of the underlying error
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

trait AtStep<T> {
    fn at(self, step: BrokerStep) -> Result<T, BrokerError>;
}

impl<T> AtStep<T> for AuthResult<T> {
    fn at(self, step: BrokerStep) -> Result<T, BrokerError> {
        self.map_err(|source| {
            warn!(step = %step, code = source.code(), error = %source, "Broker step failed");
            BrokerError { step, source }
        })
    }
}

/// Token broker bound to one mode
#[derive(Debug, Clone)]
pub struct TokenBroker {
    mode: BrokerMode,
    credentials: ClientCredentialsClient,
    graph: GraphClient,
    site: Option<SiteTarget>,
    list_name: Option<String>,
}

impl TokenBroker {
    /// Build a broker for `mode`
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] if `config` lacks the site or list settings
    ///   `mode` needs
    /// - [`AuthError::Network`] if the HTTP client cannot be built
    pub fn new(config: &BrokerConfig, mode: BrokerMode) -> AuthResult<Self> {
        if matches!(mode, BrokerMode::Site | BrokerMode::Project) && config.site.is_none() {
            return Err(ConfigError::Missing {
                key: "SHAREPOINT_SITE_ID",
            }
            .into());
        }
        if mode == BrokerMode::Project && config.list_name.is_none() {
            return Err(ConfigError::Missing {
                key: "SHAREPOINT_LIST_NAME",
            }
            .into());
        }

        let http = ProviderHttpClient::new(&config.http)?;
        Ok(Self {
            mode,
            credentials: ClientCredentialsClient::new(config, http.clone())?,
            graph: GraphClient::new(&config.graph_base_url, http),
            site: config.site.clone(),
            list_name: config.list_name.clone(),
        })
    }

    /// Configured mode
    pub fn mode(&self) -> BrokerMode {
        self.mode
    }

    /// Run one broker request
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] naming the step that failed.
    pub async fn handle(&self) -> Result<Value, BrokerError> {
        let token = self.credentials.acquire().await.at(BrokerStep::Token)?;

        match self.mode {
            BrokerMode::Token => {
                info!(mode = %self.mode, "Broker request complete");
                Ok(json!({"status": "ok"}))
            }
            BrokerMode::Site => {
                let site = self.site(&token).await?;
                let mut reply = Map::new();
                reply.insert("accessToken".into(), Value::String(token.secret().to_string()));
                reply.extend(site);
                info!(mode = %self.mode, "Broker request complete");
                Ok(Value::Object(reply))
            }
            BrokerMode::Project => {
                let site = self.site(&token).await?;
                let site_id = match (site.get("id").and_then(Value::as_str), &self.site) {
                    (Some(id), _) => id.to_string(),
                    (None, Some(SiteTarget::Id(id))) => id.clone(),
                    (None, _) => {
                        return Err(AuthError::provider_with_description(
                            "invalid_graph_response",
                            "site resource has no id",
                        ))
                        .at(BrokerStep::Site);
                    }
                };
                let list_name = self.list_name.as_deref().unwrap_or_default();
                let project_id = self
                    .graph
                    .find_list_id(&token, &site_id, list_name)
                    .await
                    .at(BrokerStep::List)?;
                info!(mode = %self.mode, project_id = %project_id, "Broker request complete");
                Ok(json!({"projectId": project_id}))
            }
        }
    }

    async fn site(&self, token: &AccessToken) -> Result<Map<String, Value>, BrokerError> {
        let target = self
            .site
            .as_ref()
            .ok_or(AuthError::Config(ConfigError::Missing {
                key: "SHAREPOINT_SITE_ID",
            }))
            .at(BrokerStep::Site)?;
        self.graph.get_site(token, target).await.at(BrokerStep::Site)
    }
}
