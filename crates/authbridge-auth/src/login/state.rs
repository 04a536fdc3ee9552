//! Login states and the transition function

use std::fmt;

/// Where a login stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// No tokens and no callback: offer a login link
    NeedLogin,
    /// The provider redirected back with an authorization response
    AwaitingCallback,
    /// Tokens stored, user profile not yet loaded
    AwaitingProfile,
    /// Tokens stored and profile loaded
    SignedIn,
    /// Sign-out requested: revoke and clear
    SigningOut,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NeedLogin => "need_login",
            Self::AwaitingCallback => "awaiting_callback",
            Self::AwaitingProfile => "awaiting_profile",
            Self::SignedIn => "signed_in",
            Self::SigningOut => "signing_out",
        })
    }
}

/// Inputs the state is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginSnapshot {
    /// A token response is stored
    pub has_tokens: bool,
    /// The current location is the redirect URI
    pub at_callback: bool,
    /// The user profile has been loaded in this session
    pub profile_loaded: bool,
    /// The user asked to sign out
    pub sign_out_requested: bool,
}

impl LoginState {
    /// Derive the state from a snapshot
    ///
    /// Sign-out wins over everything; a stored token wins over a callback, so
    /// a reloaded redirect page never exchanges a code twice.
    pub fn evaluate(snapshot: &LoginSnapshot) -> Self {
        match snapshot {
            LoginSnapshot {
                sign_out_requested: true,
                ..
            } => Self::SigningOut,
            LoginSnapshot {
                has_tokens: true,
                profile_loaded: true,
                ..
            } => Self::SignedIn,
            LoginSnapshot {
                has_tokens: true, ..
            } => Self::AwaitingProfile,
            LoginSnapshot {
                at_callback: true, ..
            } => Self::AwaitingCallback,
            _ => Self::NeedLogin,
        }
    }
}
