//! `WWW-Authenticate` challenge parsing (RFC 9110 §11.6.1)
//!
//! A token endpoint that answers with a challenge is refusing the client's
//! authentication; the login flow logs the challenges and aborts.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use http::HeaderMap;
use http::header::WWW_AUTHENTICATE;
use oauth2::AsyncHttpClient;
use tracing::info;

use crate::error::{AuthError, AuthResult};
use crate::http::{HttpRequest, HttpResponse, ProviderHttpClient};

/// One authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Scheme, lowercased (`bearer`, `basic`, `dpop`, ...)
    pub scheme: String,
    /// Token68 payload, for schemes that use one
    pub token68: Option<String>,
    /// Auth parameters, names lowercased
    pub params: BTreeMap<String, String>,
}

impl Challenge {
    fn new(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            token68: None,
            params: BTreeMap::new(),
        }
    }

    /// Look up a parameter by case-insensitive name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `error` parameter
    pub fn error(&self) -> Option<&str> {
        self.param("error")
    }

    /// `error_description` parameter
    pub fn error_description(&self) -> Option<&str> {
        self.param("error_description")
    }
}

fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn is_token68_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~+/".contains(c)
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn quoted(&mut self) -> AuthResult<String> {
        // Opening quote already peeked
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(malformed("unterminated quoted string")),
                Some('"') => {
                    self.bump();
                    return Ok(value);
                }
                Some('\\') => {
                    self.bump();
                    let escaped = self
                        .peek()
                        .ok_or_else(|| malformed("dangling escape in quoted string"))?;
                    value.push(escaped);
                    self.bump();
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Whether the upcoming element is `name=value` rather than a new scheme
    fn at_param(&self) -> bool {
        let mut lookahead = Cursor {
            input: self.input,
            pos: self.pos,
        };
        if lookahead.take_while(is_tchar).is_empty() {
            return false;
        }
        lookahead.skip_ws();
        if lookahead.peek() != Some('=') {
            return false;
        }
        lookahead.bump();
        lookahead.skip_ws();
        // `abc==` is token68 padding, not a parameter
        lookahead.peek().is_some_and(|c| c == '"' || is_tchar(c))
    }
}

fn malformed(reason: &str) -> AuthError {
    AuthError::provider_with_description("invalid_www_authenticate", reason)
}

/// Parse a `WWW-Authenticate` header value into its challenges
///
/// # Errors
///
/// Returns [`AuthError::Provider`] if the value is not a valid challenge list.
pub fn parse_challenges(value: &str) -> AuthResult<Vec<Challenge>> {
    let mut cursor = Cursor {
        input: value,
        pos: 0,
    };
    let mut challenges = Vec::new();

    loop {
        while matches!(cursor.peek(), Some(' ' | '\t' | ',')) {
            cursor.bump();
        }
        if cursor.peek().is_none() {
            break;
        }

        let scheme = cursor.take_while(is_tchar);
        if scheme.is_empty() {
            return Err(malformed("expected an auth scheme"));
        }
        let mut challenge = Challenge::new(scheme);
        cursor.skip_ws();

        // token68 appears only directly after the scheme
        if cursor.peek().is_some_and(|c| c != ',') && !cursor.at_param() {
            let token68 = cursor.take_while(is_token68_char);
            let padding = cursor.take_while(|c| c == '=');
            if token68.is_empty() {
                return Err(malformed("expected token68 or auth-param"));
            }
            challenge.token68 = Some(format!("{token68}{padding}"));
            cursor.skip_ws();
        } else {
            let mut first = true;
            loop {
                cursor.skip_ws();
                if !first {
                    if cursor.peek() != Some(',') {
                        break;
                    }
                    let rewind = cursor.pos;
                    cursor.bump();
                    while matches!(cursor.peek(), Some(' ' | '\t' | ',')) {
                        cursor.bump();
                    }
                    if !cursor.at_param() {
                        cursor.pos = rewind;
                        break;
                    }
                } else if !cursor.at_param() {
                    break;
                }
                first = false;

                let name = cursor.take_while(is_tchar).to_ascii_lowercase();
                cursor.skip_ws();
                cursor.bump(); // '='
                cursor.skip_ws();
                let value = match cursor.peek() {
                    Some('"') => cursor.quoted()?,
                    _ => {
                        let token = cursor.take_while(is_tchar);
                        if token.is_empty() {
                            return Err(malformed("expected a parameter value"));
                        }
                        token.to_string()
                    }
                };
                challenge.params.insert(name, value);
            }
        }

        match cursor.peek() {
            None | Some(',') => challenges.push(challenge),
            Some(_) => return Err(malformed("unexpected characters after challenge")),
        }
    }

    Ok(challenges)
}

/// Abort if a response carries `WWW-Authenticate` challenges
///
/// Every challenge is logged before returning the first one as an
/// [`AuthError::Provider`].
///
/// # Errors
///
/// Returns [`AuthError::Provider`] when at least one challenge is present or
/// the header cannot be parsed.
pub fn ensure_no_challenges(headers: &HeaderMap, endpoint: &str) -> AuthResult<()> {
    let mut challenges = Vec::new();
    for value in headers.get_all(WWW_AUTHENTICATE) {
        let value = value
            .to_str()
            .map_err(|_| malformed("header is not visible ASCII"))?;
        challenges.extend(parse_challenges(value)?);
    }

    let Some(first) = challenges.first() else {
        return Ok(());
    };

    for challenge in &challenges {
        info!(
            endpoint = endpoint,
            scheme = %challenge.scheme,
            error = ?challenge.error(),
            description = ?challenge.error_description(),
            "WWW-Authenticate challenge"
        );
    }

    Err(AuthError::Provider {
        error: first
            .error()
            .unwrap_or("www_authenticate_challenge")
            .to_string(),
        description: Some(
            first
                .error_description()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} challenge from {endpoint}", first.scheme)),
        ),
    })
}

/// oauth2 HTTP client that refuses responses carrying a challenge
///
/// The check runs before oauth2 looks at the status or body, so a challenge
/// on an otherwise well-formed token response still aborts the request.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeCheckingClient<'a> {
    http: &'a ProviderHttpClient,
    endpoint: &'a str,
}

impl<'a> ChallengeCheckingClient<'a> {
    /// Wrap `http` for requests to `endpoint`
    pub fn new(http: &'a ProviderHttpClient, endpoint: &'a str) -> Self {
        Self { http, endpoint }
    }
}

impl<'c> AsyncHttpClient<'c> for ChallengeCheckingClient<'_> {
    type Error = AuthError;
    type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, AuthError>> + Send + 'c>>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move {
            let response = self
                .http
                .call(request)
                .await
                .map_err(|e| AuthError::network(self.endpoint, e))?;
            ensure_no_challenges(response.headers(), self.endpoint)?;
            Ok(response)
        })
    }
}
