//! OAuth2 helpers
//!
//! - `client_credentials` - service-to-service token acquisition
//! - `www_authenticate` - challenge parsing for token endpoint responses, and
//!   the oauth2 HTTP client that enforces it
//!
//! The authorization code exchange used by the browser login lives in
//! [`crate::login`], since it is bound to that flow's stored state.

pub mod client_credentials;
pub mod www_authenticate;

pub use client_credentials::{AccessToken, ClientCredentialsClient};
pub use www_authenticate::{
    Challenge, ChallengeCheckingClient, ensure_no_challenges, parse_challenges,
};
