//! JWT Infrastructure
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  JwksFetcher                 │  GET {issuer}/.well-known/jwks.json
//! │  (fresh fetch per request)   │
//! └──────────────┬───────────────┘
//!                │ JwkSet
//!        ┌───────▼────────┐
//!        │ BearerVerifier │  key selection, signature, aud, exp
//!        └────────────────┘
//! ```
//!
//! # Modules
//!
//! - `claims` - Registered claims plus decoding of unverified payloads
//! - `jwks` - Key set fetching
//! - `verifier` - Bearer extraction and verification

pub mod claims;
pub mod jwks;
pub mod verifier;

pub use claims::{Audience, Claims};
pub use jwks::JwksFetcher;
pub use verifier::{BearerVerifier, VerifiedToken, extract_bearer};
