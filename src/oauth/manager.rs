//! Session lifecycle manager
//!
//! Drives one request through the login state machine:
//!
//! ```text
//! stored token? ── valid ──────────────────────────────▶ Authenticated
//!      │ expired / invalid: drop it
//!      ▼
//! config complete? ── no ──▶ Err(Config)                 (fatal, no network)
//!      ▼
//! `code` in query? ── no ──▶ initiate ──▶ LoginRequired  (wait for browser)
//!      ▼
//! callback: restore snapshot ▶ exchange ▶ validate ──▶ Authenticated
//!                                  └── any failure ──▶ initiate ▶ LoginRequired
//! ```
//!
//! Every path ends in a definitive outcome within the same call. The redirect
//! itself is never awaited: the initiate path returns, and the flow resumes
//! when the browser makes a new request carrying `code` and `state`.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::authorize::{LoginRenderer, LoginRequest, begin_login};
use super::correlation::CorrelationCache;
use super::exchange::TokenClient;
use super::jwks::JwksCache;
use super::query::{CALLBACK_KEYS, QueryParams};
use super::session::SessionStore;
use super::validate::{TokenStatus, TokenValidator};
use crate::clock::system_clock;
use crate::config::{HttpSettings, OAuthConfig, Settings};
use crate::{Error, Result};

/// Why the user is being shown the login link again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The stored session's token has expired
    SessionExpired,
    /// The stored session's token no longer verifies
    SessionInvalid(String),
    /// The code-for-token exchange failed
    ExchangeFailed(String),
    /// The freshly issued token did not verify
    TokenRejected(String),
    /// The provider redirected back with an error instead of a code
    ProviderError {
        /// OAuth error code
        error: String,
        /// Optional human-readable description
        description: Option<String>,
    },
    /// The callback carried a code but no state
    MissingState,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExpired => write!(f, "OAuth token Expired"),
            Self::SessionInvalid(reason) => write!(f, "OAuth token Invalid: {reason}"),
            Self::ExchangeFailed(reason) => write!(f, "{reason}"),
            Self::TokenRejected(reason) => write!(f, "Invalid OAuth Token: {reason}"),
            Self::ProviderError {
                error,
                description: Some(description),
            } => write!(f, "Authorization failed: {error} - {description}"),
            Self::ProviderError { error, .. } => write!(f, "Authorization failed: {error}"),
            Self::MissingState => write!(f, "Authorization response is missing the state parameter"),
        }
    }
}

/// Where a request ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The session holds a verified token
    Authenticated {
        /// Identity claim, or the unmapped placeholder
        identity: String,
        /// Pre-login query parameters recovered on the callback request.
        /// `None` when the session was already established.
        restored_query: Option<QueryParams>,
    },
    /// Show the login link and stop processing this request
    LoginRequired {
        /// The pending authorization request
        login: LoginRequest,
        /// Message for the user, if something went wrong
        notice: Option<Notice>,
    },
}

impl AuthOutcome {
    /// Whether the request is authenticated
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Identity of an authenticated request
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            Self::LoginRequired { .. } => None,
        }
    }
}

/// Build the outbound HTTP client with explicit timeouts
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .user_agent(concat!("oauth-gate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::Http)
}

/// Orchestrates login, callback, validation and logout for one provider
/// block at a time. Holds only process-wide shared state; per-user state
/// lives in the [`SessionStore`] passed to each call.
#[derive(Clone)]
pub struct SessionManager {
    correlation: Arc<CorrelationCache>,
    validator: TokenValidator,
    tokens: TokenClient,
    renderer: Option<LoginRenderer>,
}

impl SessionManager {
    /// Assemble a manager from its collaborators
    #[must_use]
    pub fn new(
        correlation: Arc<CorrelationCache>,
        jwks: Arc<JwksCache>,
        tokens: TokenClient,
    ) -> Self {
        Self {
            correlation,
            validator: TokenValidator::new(jwks),
            tokens,
            renderer: None,
        }
    }

    /// Build a manager with caches and HTTP client configured from `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = build_http_client(&settings.http)?;
        let clock = system_clock();
        let correlation = Arc::new(CorrelationCache::new(settings.cache.state_ttl, clock.clone()));
        let jwks = Arc::new(JwksCache::new(http.clone(), settings.cache.jwks_ttl, clock));
        Ok(Self::new(correlation, jwks, TokenClient::new(http)))
    }

    /// Call `renderer` with the login URL whenever a login is initiated
    #[must_use]
    pub fn with_login_renderer(mut self, renderer: LoginRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// The shared correlation cache
    #[must_use]
    pub fn correlation(&self) -> &Arc<CorrelationCache> {
        &self.correlation
    }

    /// The shared key cache
    #[must_use]
    pub fn jwks(&self) -> &Arc<JwksCache> {
        self.validator.jwks()
    }

    /// Single entry point for a request.
    ///
    /// Returns `Err` only for fatal configuration errors; every recoverable
    /// failure becomes [`AuthOutcome::LoginRequired`] with a [`Notice`].
    pub async fn authenticate<S>(
        &self,
        config: &OAuthConfig,
        query: &QueryParams,
        session: &mut S,
    ) -> Result<AuthOutcome>
    where
        S: SessionStore + ?Sized,
    {
        let mut notice = None;

        if let Some(token) = session.token() {
            match self.validator.validate(&token, config).await {
                TokenStatus::Valid(identity) => {
                    return Ok(AuthOutcome::Authenticated {
                        identity,
                        restored_query: None,
                    });
                }
                TokenStatus::ExpiredSignature => {
                    session.clear_token();
                    info!("Stored OAuth token expired, session cleared");
                    notice = Some(Notice::SessionExpired);
                }
                TokenStatus::Invalid(reason) => {
                    session.clear_token();
                    warn!(reason = %reason, "Stored OAuth token invalid, session cleared");
                    notice = Some(Notice::SessionInvalid(reason));
                }
            }
        }

        config.ensure_valid()?;

        if query.contains("code") {
            return self.callback(config, query, session).await;
        }

        if let Some(error) = query.first("error") {
            let provider_error = Notice::ProviderError {
                error: error.to_string(),
                description: query.first("error_description").map(str::to_string),
            };
            warn!(notice = %provider_error, "Provider returned an error");
            let restored = self.restore(query);
            return self.initiate(config, &restored, Some(provider_error));
        }

        self.initiate(config, query, notice)
    }

    /// Initiate path: present a fresh login link and stop.
    pub fn initiate(
        &self,
        config: &OAuthConfig,
        query: &QueryParams,
        notice: Option<Notice>,
    ) -> Result<AuthOutcome> {
        config.ensure_valid()?;
        let login = begin_login(config, query, &self.correlation, self.renderer.as_ref())?;
        Ok(AuthOutcome::LoginRequired { login, notice })
    }

    /// Callback path: the browser is back from the provider with `code` and
    /// `state`. On success the token is stored in `session`.
    pub async fn callback<S>(
        &self,
        config: &OAuthConfig,
        query: &QueryParams,
        session: &mut S,
    ) -> Result<AuthOutcome>
    where
        S: SessionStore + ?Sized,
    {
        config.ensure_valid()?;

        let Some(code) = query.first("code") else {
            return self.initiate(config, query, None);
        };
        let Some(state) = query.first("state") else {
            warn!("Callback carried a code but no state");
            return self.initiate(config, &query.without(&CALLBACK_KEYS), Some(Notice::MissingState));
        };

        let restored = self.restore(query);
        debug!(state = %state, restored = restored.len(), "Handling authorization callback");

        let token = match self.tokens.exchange_code(config, code, state).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token exchange failed");
                return self.initiate(config, &restored, Some(Notice::ExchangeFailed(e.to_string())));
            }
        };

        match self.validator.validate(&token, config).await {
            TokenStatus::Valid(identity) => {
                session.store_token(&token);
                info!(identity = %identity, "OAuth session established");
                Ok(AuthOutcome::Authenticated {
                    identity,
                    restored_query: Some(restored),
                })
            }
            TokenStatus::ExpiredSignature => {
                warn!("Freshly issued token is already expired");
                self.initiate(
                    config,
                    &restored,
                    Some(Notice::TokenRejected("token already expired".to_string())),
                )
            }
            TokenStatus::Invalid(reason) => {
                warn!(reason = %reason, "Freshly issued token rejected");
                self.initiate(config, &restored, Some(Notice::TokenRejected(reason)))
            }
        }
    }

    /// Consume the snapshot parked under the callback's `state` and merge the
    /// callback URL's own parameters over it, minus the callback keys.
    fn restore(&self, query: &QueryParams) -> QueryParams {
        let mut restored = query
            .first("state")
            .and_then(|state| self.correlation.take(state))
            .unwrap_or_default();
        restored.overlay(&query.without(&CALLBACK_KEYS));
        restored
    }

    /// Drop the session's token; the next request starts unauthenticated.
    /// Returns whether a token was stored.
    pub fn logout<S>(&self, session: &mut S) -> bool
    where
        S: SessionStore + ?Sized,
    {
        let had_token = session.clear_token();
        if had_token {
            info!("OAuth session logged out");
        }
        had_token
    }
}
