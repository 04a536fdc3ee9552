//! Configuration Types
//!
//! Every flow reads its settings once at process start, validates them eagerly
//! and hands the typed result to its handlers. Nothing reads the environment
//! after startup.
//!
//! Settings come from an optional file (TOML, YAML or JSON) overlaid by the
//! process environment. Keys are the environment variable names, lowercased in
//! files: `ISSUER_URL` in the environment, `issuer_url` in a file.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Default authority for Microsoft identity platform token requests
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default Microsoft Graph base URL
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";

/// Scopes requested by the browser login flow
pub const LOGIN_SCOPES: &str = "openid email";

/// Raw configuration sources
///
/// Wraps the layered `config::Config` so callers can build settings from a
/// file, the process environment, or an explicit map (tests).
#[derive(Debug, Clone)]
pub struct Settings {
    inner: Config,
}

impl Settings {
    /// Load from an optional file overlaid by the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, has an unsupported
    /// extension, or cannot be parsed.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(file, Environment::default())
    }

    /// Build from an explicit set of environment-style variables
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the map cannot be turned into settings.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<config::Map<String, String>>();
        Self::build(None, Environment::default().source(Some(map)))
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::invalid(
                    "CONFIG_FILE",
                    format!("file not found: {}", path.display()),
                ));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => {
                    return Err(ConfigError::invalid(
                        "CONFIG_FILE",
                        "unsupported format, use .toml, .yaml, .yml or .json",
                    ));
                }
            };
            let name = path
                .to_str()
                .ok_or_else(|| ConfigError::invalid("CONFIG_FILE", "path is not valid UTF-8"))?;
            builder = builder.add_source(File::new(name, format));
        }

        // Environment variables override file settings
        let inner = builder.add_source(env).build()?;
        Ok(Self { inner })
    }

    /// Look up a key by its environment variable name, treating blanks as absent
    pub fn optional(&self, env_key: &str) -> Option<String> {
        self.inner
            .get_string(&env_key.to_ascii_lowercase())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Look up a required key
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming `env_key` when absent or blank.
    pub fn required(&self, env_key: &'static str) -> Result<String, ConfigError> {
        self.optional(env_key)
            .ok_or(ConfigError::Missing { key: env_key })
    }

    fn required_url(&self, env_key: &'static str) -> Result<Url, ConfigError> {
        parse_url(env_key, &self.required(env_key)?)
    }

    fn optional_url(&self, env_key: &'static str) -> Result<Option<Url>, ConfigError> {
        self.optional(env_key)
            .map(|v| parse_url(env_key, &v))
            .transpose()
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(
            key,
            format!("unsupported scheme: {other}"),
        )),
    }
}

fn trim_slash(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

/// Outbound HTTP settings shared by every flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Per-request timeout for every outbound call
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpSettings {
    /// Read `HTTP_TIMEOUT_SECS` (default 10)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value is not a positive integer.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        match settings.optional("HTTP_TIMEOUT_SECS") {
            None => Ok(Self::default()),
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::invalid("HTTP_TIMEOUT_SECS", "not an integer"))?;
                if secs == 0 {
                    return Err(ConfigError::invalid(
                        "HTTP_TIMEOUT_SECS",
                        "must be greater than zero",
                    ));
                }
                Ok(Self {
                    timeout: Duration::from_secs(secs),
                })
            }
        }
    }
}

/// How the verifier picks a key out of the fetched key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySelection {
    /// Always use the first key in the set, ignoring the token's `kid`
    FirstKey,
    /// Use the key whose `kid` matches the token header
    #[default]
    KeyId,
}

impl std::str::FromStr for KeySelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" | "first_key" => Ok(Self::FirstKey),
            "kid" | "key_id" => Ok(Self::KeyId),
            other => Err(ConfigError::invalid(
                "VERIFIER_KEY_SELECTION",
                format!("expected `first` or `key_id`, got `{other}`"),
            )),
        }
    }
}

/// Bearer-token verifier configuration
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Token issuer (`ISSUER_URL`)
    pub issuer_url: Url,
    /// Key set location (`JWKS_URI`, default `{issuer}/.well-known/jwks.json`)
    pub jwks_uri: Url,
    /// Expected `aud` claim: this service's own base URL
    pub audience: String,
    /// Key selection policy
    pub key_selection: KeySelection,
    /// Outbound HTTP settings
    pub http: HttpSettings,
}

impl VerifierConfig {
    /// Validate verifier settings for a service listening on `port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `ISSUER_URL` is absent or any URL is invalid.
    pub fn from_settings(settings: &Settings, port: u16) -> Result<Self, ConfigError> {
        let issuer_url = settings.required_url("ISSUER_URL")?;
        let jwks_uri = match settings.optional_url("JWKS_URI")? {
            Some(uri) => uri,
            None => parse_url(
                "ISSUER_URL",
                &format!("{}/.well-known/jwks.json", trim_slash(&issuer_url)),
            )?,
        };
        let audience = settings
            .optional("VERIFIER_AUDIENCE")
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        let key_selection = settings
            .optional("VERIFIER_KEY_SELECTION")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            issuer_url,
            jwks_uri,
            audience,
            key_selection,
            http: HttpSettings::from_settings(settings)?,
        })
    }
}

/// What the token broker does with an incoming request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    /// Acquire a token and report success
    #[default]
    Token,
    /// Acquire a token and relay the site resource merged with it
    Site,
    /// Resolve the site, then the first list matching the configured name
    Project,
}

impl fmt::Display for BrokerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Token => "token",
            Self::Site => "site",
            Self::Project => "project",
        })
    }
}

/// How the downstream site is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteTarget {
    /// Opaque Graph site identifier (`SHAREPOINT_SITE_ID`)
    Id(String),
    /// Host plus server-relative site name
    Path {
        /// `SHAREPOINT_TARGET_HOST`, e.g. `contoso.sharepoint.com`
        host: String,
        /// `SHAREPOINT_SITE_NAME`
        site_name: String,
    },
}

impl SiteTarget {
    /// Graph path segment addressing this site
    pub fn graph_segment(&self) -> String {
        match self {
            Self::Id(id) => id.clone(),
            Self::Path { host, site_name } => format!("{host}:/sites/{site_name}"),
        }
    }
}

/// Service-to-service token broker configuration
#[derive(Clone)]
pub struct BrokerConfig {
    /// Application (client) identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: SecretString,
    /// Directory (tenant) identifier
    pub tenant_id: String,
    /// Downstream site, when configured
    pub site: Option<SiteTarget>,
    /// Display name of the list looked up in project mode
    pub list_name: Option<String>,
    /// Identity provider authority
    pub authority_host: Url,
    /// Downstream API base URL
    pub graph_base_url: Url,
    /// Outbound HTTP settings
    pub http: HttpSettings,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("site", &self.site)
            .field("list_name", &self.list_name)
            .field("authority_host", &self.authority_host.as_str())
            .field("graph_base_url", &self.graph_base_url.as_str())
            .finish()
    }
}

impl BrokerConfig {
    /// Validate broker settings for `mode`
    ///
    /// Credentials are always required; site and list settings only for the
    /// modes that call the downstream API.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first absent variable.
    pub fn from_settings(settings: &Settings, mode: BrokerMode) -> Result<Self, ConfigError> {
        let client_id = settings.required("SHAREPOINT_CLIENT_ID")?;
        let client_secret = SecretString::new(settings.required("SHAREPOINT_CLIENT_SECRET")?);
        let tenant_id = settings.required("SHAREPOINT_TENANT_ID")?;

        let site = match settings.optional("SHAREPOINT_SITE_ID") {
            Some(id) => Some(SiteTarget::Id(id)),
            None => match (
                settings.optional("SHAREPOINT_TARGET_HOST"),
                settings.optional("SHAREPOINT_SITE_NAME"),
            ) {
                (Some(host), Some(site_name)) => Some(SiteTarget::Path { host, site_name }),
                _ => None,
            },
        };
        let list_name = settings.optional("SHAREPOINT_LIST_NAME");

        match mode {
            BrokerMode::Token => {}
            BrokerMode::Site | BrokerMode::Project if site.is_none() => {
                return Err(ConfigError::Missing {
                    key: "SHAREPOINT_SITE_ID",
                });
            }
            BrokerMode::Project if list_name.is_none() => {
                return Err(ConfigError::Missing {
                    key: "SHAREPOINT_LIST_NAME",
                });
            }
            BrokerMode::Site | BrokerMode::Project => {}
        }

        let authority_host = settings
            .optional_url("SHAREPOINT_AUTHORITY_HOST")?
            .map_or_else(|| parse_url("SHAREPOINT_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST), Ok)?;
        let graph_base_url = settings
            .optional_url("SHAREPOINT_GRAPH_BASE_URL")?
            .map_or_else(|| parse_url("SHAREPOINT_GRAPH_BASE_URL", DEFAULT_GRAPH_BASE_URL), Ok)?;

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
            site,
            list_name,
            authority_host,
            graph_base_url,
            http: HttpSettings::from_settings(settings)?,
        })
    }

    /// Client-credentials token endpoint for the configured tenant
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            trim_slash(&self.authority_host),
            self.tenant_id
        )
    }

    /// Resource default scope (`{graph}/.default`)
    pub fn default_scope(&self) -> String {
        format!("{}/.default", trim_slash(&self.graph_base_url))
    }
}

/// Browser login flow configuration
#[derive(Clone)]
pub struct LoginConfig {
    /// OpenID provider issuer
    pub issuer_url: Url,
    /// Registered client identifier
    pub client_id: String,
    /// Client secret, sent with `client_secret_basic`
    pub client_secret: SecretString,
    /// Application root; navigation target after callback and sign-out
    pub app_root: Url,
    /// `{app_root}/redirect`
    pub redirect_uri: Url,
    /// Outbound HTTP settings
    pub http: HttpSettings,
}

impl fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginConfig")
            .field("issuer_url", &self.issuer_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish()
    }
}

impl LoginConfig {
    /// Validate login settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first absent or invalid variable.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let issuer_url = settings.required_url("OIDC_ISSUER_URL")?;
        let client_id = settings.required("OIDC_CLIENT_ID")?;
        let client_secret = SecretString::new(settings.required("OIDC_CLIENT_SECRET")?);
        let app_root = settings.required_url("OIDC_APP_HOST")?;
        let redirect_uri = parse_url(
            "OIDC_APP_HOST",
            &format!("{}/redirect", trim_slash(&app_root)),
        )?;

        Ok(Self {
            issuer_url,
            client_id,
            client_secret,
            app_root,
            redirect_uri,
            http: HttpSettings::from_settings(settings)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn broker_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SHAREPOINT_CLIENT_ID", "client-123"),
            ("SHAREPOINT_CLIENT_SECRET", "s3cret"),
            ("SHAREPOINT_TENANT_ID", "tenant-abc"),
        ]
    }

    #[test]
    fn test_verifier_defaults() {
        let settings = Settings::from_vars([("ISSUER_URL", "https://idp.example.com/")]).unwrap();
        let config = VerifierConfig::from_settings(&settings, 5500).unwrap();

        assert_eq!(
            config.jwks_uri.as_str(),
            "https://idp.example.com/.well-known/jwks.json"
        );
        assert_eq!(config.audience, "http://localhost:5500");
        assert_eq!(config.key_selection, KeySelection::KeyId);
        assert_eq!(config.http.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_verifier_requires_issuer() {
        let settings = Settings::from_vars(Vec::<(String, String)>::new()).unwrap();
        let err = VerifierConfig::from_settings(&settings, 5500).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "ISSUER_URL" }));
    }

    #[test]
    fn test_verifier_key_selection_override() {
        let settings = Settings::from_vars([
            ("ISSUER_URL", "https://idp.example.com"),
            ("VERIFIER_KEY_SELECTION", "first"),
            ("VERIFIER_AUDIENCE", "https://api.example.com"),
        ])
        .unwrap();
        let config = VerifierConfig::from_settings(&settings, 5500).unwrap();
        assert_eq!(config.key_selection, KeySelection::FirstKey);
        assert_eq!(config.audience, "https://api.example.com");
    }

    #[test]
    fn test_invalid_issuer_scheme() {
        let settings = Settings::from_vars([("ISSUER_URL", "ftp://idp.example.com")]).unwrap();
        let err = VerifierConfig::from_settings(&settings, 5500).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ISSUER_URL", .. }));
    }

    #[test]
    fn test_broker_missing_secret_is_named() {
        let settings = Settings::from_vars([
            ("SHAREPOINT_CLIENT_ID", "client-123"),
            ("SHAREPOINT_TENANT_ID", "tenant-abc"),
        ])
        .unwrap();
        let err = BrokerConfig::from_settings(&settings, BrokerMode::Token).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "SHAREPOINT_CLIENT_SECRET"
            }
        ));
    }

    #[test]
    fn test_broker_blank_value_counts_as_missing() {
        let mut vars = broker_vars();
        vars[2] = ("SHAREPOINT_TENANT_ID", "   ");
        let settings = Settings::from_vars(vars).unwrap();
        let err = BrokerConfig::from_settings(&settings, BrokerMode::Token).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "SHAREPOINT_TENANT_ID"
            }
        ));
    }

    #[test]
    fn test_broker_token_mode_endpoints() {
        let settings = Settings::from_vars(broker_vars()).unwrap();
        let config = BrokerConfig::from_settings(&settings, BrokerMode::Token).unwrap();

        assert_eq!(
            config.token_endpoint(),
            "https://login.microsoftonline.com/tenant-abc/oauth2/v2.0/token"
        );
        assert_eq!(config.default_scope(), "https://graph.microsoft.com/.default");
        assert_eq!(config.client_secret.expose_secret(), "s3cret");
        assert!(config.site.is_none());
    }

    #[test]
    fn test_broker_debug_redacts_secret() {
        let settings = Settings::from_vars(broker_vars()).unwrap();
        let config = BrokerConfig::from_settings(&settings, BrokerMode::Token).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_broker_site_mode_requires_site() {
        let settings = Settings::from_vars(broker_vars()).unwrap();
        let err = BrokerConfig::from_settings(&settings, BrokerMode::Site).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "SHAREPOINT_SITE_ID"
            }
        ));
    }

    #[test]
    fn test_broker_site_path_target() {
        let mut vars = broker_vars();
        vars.push(("SHAREPOINT_TARGET_HOST", "contoso.sharepoint.com"));
        vars.push(("SHAREPOINT_SITE_NAME", "projects"));
        let settings = Settings::from_vars(vars).unwrap();
        let config = BrokerConfig::from_settings(&settings, BrokerMode::Site).unwrap();

        assert_eq!(
            config.site.unwrap().graph_segment(),
            "contoso.sharepoint.com:/sites/projects"
        );
    }

    #[test]
    fn test_broker_project_mode_requires_list_name() {
        let mut vars = broker_vars();
        vars.push(("SHAREPOINT_SITE_ID", "site-1"));
        let settings = Settings::from_vars(vars).unwrap();
        let err = BrokerConfig::from_settings(&settings, BrokerMode::Project).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "SHAREPOINT_LIST_NAME"
            }
        ));
    }

    #[test]
    fn test_login_redirect_uri() {
        let settings = Settings::from_vars([
            ("OIDC_ISSUER_URL", "https://idp.example.com"),
            ("OIDC_CLIENT_ID", "spa"),
            ("OIDC_CLIENT_SECRET", "secret"),
            ("OIDC_APP_HOST", "http://localhost:3000/"),
        ])
        .unwrap();
        let config = LoginConfig::from_settings(&settings).unwrap();
        assert_eq!(config.redirect_uri.as_str(), "http://localhost:3000/redirect");
    }

    #[test]
    fn test_http_timeout_validation() {
        let settings = Settings::from_vars([("HTTP_TIMEOUT_SECS", "0")]).unwrap();
        assert!(HttpSettings::from_settings(&settings).is_err());

        let settings = Settings::from_vars([("HTTP_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(
            HttpSettings::from_settings(&settings).unwrap().timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_settings_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authbridge.toml");
        std::fs::write(&path, "issuer_url = \"https://file.example.com\"\n").unwrap();

        let settings = Settings::build(
            Some(&path),
            Environment::default().source(Some(config::Map::new())),
        )
        .unwrap();
        assert_eq!(
            settings.optional("ISSUER_URL").as_deref(),
            Some("https://file.example.com")
        );
    }
}
