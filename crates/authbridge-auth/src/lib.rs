//! # authbridge-auth
//!
//! Protocol logic for three independent authentication flows:
//!
//! - **Bearer-token verification** - extract `Authorization: Bearer`, fetch the
//!   issuer's JWKS on every request, check signature, audience and expiry
//! - **Token brokering** - acquire an application token with the client
//!   credentials grant and chain downstream Graph calls with it
//! - **Browser login** - OpenID Provider discovery, Authorization Code with
//!   PKCE (S256), user-info and revocation, driven as a state machine
//!
//! The flows share no runtime state. Each is configured once from a
//! [`config::Settings`] and fails fast with the name of the first missing
//! variable before any network call.
//!
//! ## Architecture
//!
//! - [`error`] - Error taxonomy with stable machine-readable codes
//! - [`config`] - Typed, eagerly validated configuration
//! - [`http`] - Outbound HTTP client (timeout, no redirects)
//! - [`jwt`] - JWKS fetching and bearer verification
//! - [`oauth2`] - Client credentials grant and `WWW-Authenticate` parsing
//! - [`graph`] - Site and list lookups
//! - [`broker`] - Token broker modes
//! - [`discovery`] - OpenID Provider metadata
//! - [`pkce`] - Code verifier and S256 challenge
//! - [`login`] - Login state machine and persisted state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authbridge_auth::config::{Settings, VerifierConfig};
//! use authbridge_auth::jwt::BearerVerifier;
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(None)?;
//! let verifier = BearerVerifier::new(&VerifierConfig::from_settings(&settings, 5500)?)?;
//!
//! match verifier.verify_request(Some("Bearer eyJ0eXAi...")).await {
//!     Ok(token) => println!("verified: {:?}", token.claims.sub),
//!     Err(e) => println!("rejected ({}): {e}", e.code()),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Standards
//!
//! - **RFC 6749** - OAuth 2.0 (client credentials, authorization code)
//! - **RFC 7009** - Token revocation
//! - **RFC 7517 / 7519** - JWK and JWT
//! - **RFC 7636** - PKCE
//! - **OpenID Connect Discovery 1.0**

pub mod broker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod http;
pub mod jwt;
pub mod login;
pub mod oauth2;
pub mod pkce;

#[doc(inline)]
pub use error::{AuthError, AuthResult, ConfigError, ErrorKind};

#[doc(inline)]
pub use broker::{BrokerError, BrokerStep, TokenBroker};

#[doc(inline)]
pub use jwt::{BearerVerifier, VerifiedToken};

#[doc(inline)]
pub use login::{LoginError, LoginFlow, LoginOutcome, LoginState};
