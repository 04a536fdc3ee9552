//! Authorization Code + PKCE login
//!
//! The flow is a state machine over the values held in a [`LoginStore`]:
//!
//! ```text
//!   NeedLogin ──(user follows login link)──▶ AwaitingCallback
//!       ▲                                          │ code + verifier exchanged
//!       │                                          ▼
//!   SigningOut ◀──(sign-out requested)──── AwaitingProfile
//!       ▲                                          │ user-info loaded
//!       └──────────(sign-out requested)──── SignedIn ◀┘
//! ```
//!
//! No `state` parameter is sent or accepted; a callback carrying one is
//! rejected. Tokens are never refreshed.

pub mod flow;
pub mod state;
pub mod storage;

use thiserror::Error;

use crate::error::AuthError;

pub use flow::{LoginFlow, LoginOutcome, TokenSet, UserInfo};
pub use state::{LoginSnapshot, LoginState};
pub use storage::{
    CODE_VERIFIER_KEY, FileStore, ID_TOKEN_CLAIMS_KEY, LOGIN_KEYS, LoginStore, MemoryStore,
    StorageError, TOKEN_RESPONSE_KEY,
};

/// Login flow errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoginError {
    /// Protocol, network, configuration or verification failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Persisted login state could not be read or written
    #[error("Login storage error: {0}")]
    Storage(#[from] StorageError),

    /// A callback arrived but no code verifier is stored
    #[error("No PKCE code verifier stored for this login attempt")]
    MissingVerifier,

    /// The provider does not advertise S256 PKCE
    #[error("Provider does not support the S256 PKCE challenge method")]
    UnsupportedPkceMethod,

    /// The authorization response is not acceptable
    #[error("Invalid authorization callback: {0}")]
    InvalidCallback(String),
}

impl LoginError {
    pub(crate) fn invalid_callback(reason: impl Into<String>) -> Self {
        Self::InvalidCallback(reason.into())
    }
}

/// Result type for login operations
pub type LoginResult<T> = std::result::Result<T, LoginError>;
