//! Token exchange client
//!
//! Trades an authorization code for the provider's token response with a
//! form-encoded POST to the token endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::OAuthConfig;
use crate::{Error, Result};

/// The token endpoint's JSON response, kept verbatim for the session's lifetime
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(Map<String, Value>);

impl SessionToken {
    /// Wrap a token response object
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Raw field of the response
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The signed JWT held in `token_name`, if it is a string
    #[must_use]
    pub fn jwt(&self, token_name: &str) -> Option<&str> {
        self.0.get(token_name).and_then(Value::as_str)
    }

    /// Response fields
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

// Token values stay out of logs
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("fields", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Client for the authorization-code grant
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
}

impl TokenClient {
    /// Create a client that posts through `http`
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Exchange `code` for a token.
    ///
    /// Transport failures, non-2xx responses and bodies that are not a JSON
    /// object all come back as [`Error::Transport`].
    pub async fn exchange_code(
        &self,
        config: &OAuthConfig,
        code: &str,
        state: &str,
    ) -> Result<SessionToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("scope", config.scope.as_str()),
            ("state", state),
            ("code", code),
        ];

        debug!(state = %state, endpoint = %config.token_endpoint, "Exchanging authorization code");
        let response = self
            .http
            .post(&config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "Token exchange failed: HTTP {status} - {body}"
            )));
        }

        let fields: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("Failed to parse token response: {e}")))?;

        Ok(SessionToken::new(fields))
    }
}
