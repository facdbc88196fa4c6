//! OAuth2-proxy login flow
//!
//! The gateway sits behind oauth2-proxy. Logging in means walking its
//! redirect chain by hand, letting the user authorize in a browser, and
//! exchanging the pasted callback URL for the `_oauth2_proxy` session cookie.

use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, LOCATION, SET_COOKIE};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lokicli_types::{LokiError, Result};

use crate::client::{AUTH_COOKIE, build_http_client, exchange, session_cookie};

/// State carried between starting a login and completing it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginChallenge {
    /// `name=value` of the CSRF cookie to replay on the callback
    pub csrf_cookie: String,

    /// URL the user must open to authorize
    pub authorize_url: String,
}

/// Login and session checks against one gateway
pub struct OAuth2ProxyAuth {
    http: Client,
    base_url: String,
    cancel: CancellationToken,
}

impl OAuth2ProxyAuth {
    pub fn new(base_url: impl Into<String>, cancel: CancellationToken) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            base_url: base_url.into(),
            cancel,
        })
    }

    /// Whether the gateway accepts `token` as a session
    pub async fn check(&self, token: &str) -> Result<bool> {
        let request = self
            .http
            .get(&self.base_url)
            .header(COOKIE, session_cookie(token));
        let response = exchange(&self.cancel, request).await?;
        info!(status = response.status.as_u16(), "auth status");
        Ok(response.status == StatusCode::OK)
    }

    /// Walk the redirect chain up to the identity provider
    pub async fn begin(&self) -> Result<LoginChallenge> {
        let response = exchange(&self.cancel, self.http.get(&self.base_url)).await?;
        if response.status != StatusCode::FOUND {
            return Err(auth_error(format!(
                "Failed to start auth flow: ({}) {}",
                response.status.as_u16(),
                response.body
            )));
        }
        let start_url = location(&response.headers)
            .ok_or_else(|| auth_error("Missing redirect to the auth start URL.".to_string()))?;

        let response = exchange(&self.cancel, self.http.get(&start_url)).await?;
        if response.status != StatusCode::FOUND {
            return Err(auth_error(format!(
                "Failed to authenticate to oauth2-proxy: ({}) {}",
                response.status.as_u16(),
                response.body
            )));
        }

        let csrf_cookie = find_cookie(&response.headers, is_csrf_cookie);
        let authorize_url = location(&response.headers);
        match (csrf_cookie, authorize_url) {
            (Some((name, value)), Some(authorize_url)) => Ok(LoginChallenge {
                csrf_cookie: format!("{}={}", name, value),
                authorize_url,
            }),
            _ => Err(auth_error(
                "Failed to retrieve CSRF token and redirect URL.".to_string(),
            )),
        }
    }

    /// Exchange the pasted callback URL for a session token
    pub async fn complete(&self, challenge: &LoginChallenge, callback_url: &str) -> Result<String> {
        let request = self
            .http
            .get(callback_url.trim())
            .header(COOKIE, &challenge.csrf_cookie);
        let response = exchange(&self.cancel, request).await?;

        if response.status != StatusCode::FOUND {
            return Err(auth_error(format!(
                "Error exchanging for access token: {} {}",
                response.status.as_u16(),
                response.body
            )));
        }

        find_cookie(&response.headers, |name| name == AUTH_COOKIE)
            .map(|(_, value)| value)
            .ok_or_else(|| auth_error("Failed to retrieve access token cookie.".to_string()))
    }
}

fn auth_error(message: String) -> LokiError {
    error!("Error getting login access token: {}", message);
    LokiError::Auth(message)
}

fn is_csrf_cookie(name: &str) -> bool {
    name.starts_with(AUTH_COOKIE) && name.ends_with("_csrf")
}

/// Absolute `https` redirect target, if any
fn location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("https"))
        .map(str::to_string)
}

/// First non-empty `Set-Cookie` whose name satisfies `matches`
fn find_cookie(headers: &HeaderMap, matches: impl Fn(&str) -> bool) -> Option<(String, String)> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .find(|(name, value)| matches(name) && !value.is_empty())
}
