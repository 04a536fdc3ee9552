//! Driving the login state machine from the command line

use authbridge_auth::login::{LoginFlow, LoginOutcome, LoginResult, LoginStore};
use tracing::debug;
use url::Url;

/// Run the flow from `start`, following navigations, until it settles on a
/// login link or a profile
///
/// # Errors
///
/// The first failing step.
pub async fn settle<S: LoginStore>(flow: &LoginFlow<S>, start: Url) -> LoginResult<LoginOutcome> {
    let mut current = start;
    loop {
        match flow.run(&current).await? {
            LoginOutcome::Navigate(next) => {
                debug!(location = %next, "Navigating");
                current = next;
            }
            settled => return Ok(settled),
        }
    }
}
