//! Downstream resource API client (Microsoft Graph sites and lists)
//!
//! Calls are made with an application token from the client credentials
//! grant. Resources are relayed as opaque JSON; only the identifiers the
//! broker chains on are read.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error};
use url::Url;

use crate::config::SiteTarget;
use crate::error::{AuthError, AuthResult, ConfigError};
use crate::http::ProviderHttpClient;
use crate::oauth2::AccessToken;

/// A Graph resource as returned by the API
pub type Resource = Map<String, Value>;

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    value: Vec<Resource>,
}

/// Client for the site and list endpoints
#[derive(Debug, Clone)]
pub struct GraphClient {
    base_url: String,
    http: ProviderHttpClient,
}

impl GraphClient {
    /// Create a client rooted at `base_url` (e.g. `https://graph.microsoft.com`)
    pub fn new(base_url: &Url, http: ProviderHttpClient) -> Self {
        Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        let raw = format!("{}/v1.0/{path}", self.base_url);
        Url::parse(&raw).map_err(|e| {
            ConfigError::invalid("SHAREPOINT_GRAPH_BASE_URL", format!("{raw}: {e}")).into()
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        token: &AccessToken,
    ) -> AuthResult<T> {
        debug!(url = %url, "Calling Graph");

        let response = self
            .http
            .client()
            .get(url.clone())
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "Graph request failed");
                AuthError::network(url.as_str(), e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<GraphErrorBody>(&body) {
                Ok(GraphErrorBody { error: detail }) => {
                    error!(url = %url, status = %status, code = %detail.code, "Graph returned an error object");
                    AuthError::Provider {
                        error: detail.code,
                        description: detail.message,
                    }
                }
                Err(_) => {
                    error!(url = %url, status = %status, "Graph returned an unexpected status");
                    AuthError::network(url.as_str(), format!("unexpected status {status}"))
                }
            });
        }

        response.json().await.map_err(|e| {
            error!(url = %url, error = %e, "Malformed Graph response");
            AuthError::provider_with_description("invalid_graph_response", e.to_string())
        })
    }

    /// `GET /v1.0/sites/{site}`
    ///
    /// # Errors
    ///
    /// - [`AuthError::Network`] on transport failure or a non-success status
    ///   without a Graph error body
    /// - [`AuthError::Provider`] for Graph error objects or non-object bodies
    pub async fn get_site(&self, token: &AccessToken, site: &SiteTarget) -> AuthResult<Resource> {
        let url = self.endpoint(&format!("sites/{}", site.graph_segment()))?;
        self.get_json(url, token).await
    }

    /// First list on `site_id` whose display name equals `list_name`
    ///
    /// `GET /v1.0/sites/{site_id}/lists?$filter=displayName eq '{list_name}'`
    ///
    /// # Errors
    ///
    /// As [`GraphClient::get_site`], plus [`AuthError::Provider`] with
    /// `list_not_found` when nothing matches.
    pub async fn find_list_id(
        &self,
        token: &AccessToken,
        site_id: &str,
        list_name: &str,
    ) -> AuthResult<String> {
        let mut url = self.endpoint(&format!("sites/{site_id}/lists"))?;
        url.query_pairs_mut().append_pair(
            "$filter",
            &format!("displayName eq '{}'", list_name.replace('\'', "''")),
        );

        let lists: Collection = self.get_json(url, token).await?;
        lists
            .value
            .iter()
            .find_map(|list| list.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                AuthError::provider_with_description(
                    "list_not_found",
                    format!("no list named `{list_name}` on site {site_id}"),
                )
            })
    }
}
