//! PKCE (RFC 7636) verifier and S256 challenge

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};

use crate::discovery::PKCE_METHOD_S256;

/// Challenge method sent to the authorization endpoint
pub const CHALLENGE_METHOD: &str = PKCE_METHOD_S256;

/// Generate a fresh high-entropy code verifier
pub fn generate_verifier() -> String {
    let (_, verifier) = PkceCodeChallenge::new_random_sha256();
    verifier.secret().to_string()
}

/// S256 challenge for `verifier`: `BASE64URL(SHA256(verifier))`
pub fn challenge_for(verifier: &str) -> String {
    let verifier = PkceCodeVerifier::new(verifier.to_string());
    PkceCodeChallenge::from_code_verifier_sha256(&verifier)
        .as_str()
        .to_string()
}

/// Whether `verifier` is 43 to 128 characters of the unreserved set
pub fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
