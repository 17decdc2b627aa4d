//! Authorization request builder
//!
//! Builds the provider redirect for a fresh state parameter and parks the
//! current query parameters in the correlation cache so they survive the
//! round-trip through the provider.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::correlation::CorrelationCache;
use super::query::{CALLBACK_KEYS, QueryParams};
use super::state::generate_state;
use crate::config::OAuthConfig;
use crate::{Error, Result};

/// Callback that presents the login URL to the user
pub type LoginRenderer = Arc<dyn Fn(&Url) + Send + Sync>;

/// A pending authorization request. Processing for the current request stops
/// here; the flow resumes when the browser comes back with `code` and `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Provider URL to send the browser to
    pub url: Url,
    /// State parameter embedded in `url`
    pub state: String,
}

/// Build the provider URL for `state`.
///
/// Query parameters are appended in the order `redirect_uri`, `client_id`,
/// `response_type`, `state`, `scope`.
pub fn authorization_url(config: &OAuthConfig, state: &str) -> Result<Url> {
    let mut url = Url::parse(&config.authorization_endpoint)
        .map_err(|e| Error::Config(format!("Invalid authorization_endpoint: {e}")))?;

    url.query_pairs_mut()
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("state", state)
        .append_pair("scope", &config.scope);

    Ok(url)
}

/// Start a login: mint a state, snapshot `current` query parameters under it,
/// and hand the URL to `render` if one is given.
///
/// Callback parameters (`code`, `state`, provider errors) are never part of
/// the snapshot.
pub fn begin_login(
    config: &OAuthConfig,
    current: &QueryParams,
    cache: &CorrelationCache,
    render: Option<&LoginRenderer>,
) -> Result<LoginRequest> {
    let state = generate_state();
    let url = authorization_url(config, &state)?;

    let snapshot = current.without(&CALLBACK_KEYS);
    if !snapshot.is_empty() {
        cache.put(&state, snapshot);
    }

    debug!(state = %state, "Presenting login link");
    if let Some(render) = render {
        render(&url);
    }

    Ok(LoginRequest { url, state })
}

/// Default rendering: a same-window link labelled "Login"
#[must_use]
pub fn login_link_html(url: &str) -> String {
    format!(r#"<a href="{}" target="_self">Login</a>"#, escape_html(url))
}

/// Escape text for an HTML attribute or element body
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig {
            authorization_endpoint: "https://idp.example.com/oauth2/authorize".into(),
            token_endpoint: "https://idp.example.com/oauth2/token".into(),
            jwks_uri: "https://idp.example.com/keys".into(),
            redirect_uri: "https://app.example.com/".into(),
            client_id: "app-123".into(),
            client_secret: "s3cret".into(),
            scope: "openid email".into(),
            ..Default::default()
        }
    }

    #[test]
    fn url_query_is_exactly_the_encoded_request() {
        // WHEN: building the URL for a known state
        let url = authorization_url(&config(), "AbC123xYz456QwE").unwrap();

        // THEN: the query string is the form-encoded request, in order
        let expected = serde_urlencoded::to_string([
            ("redirect_uri", "https://app.example.com/"),
            ("client_id", "app-123"),
            ("response_type", "code"),
            ("state", "AbC123xYz456QwE"),
            ("scope", "openid email"),
        ])
        .unwrap();
        assert_eq!(url.query(), Some(expected.as_str()));
        assert_eq!(url.path(), "/oauth2/authorize");
    }

    #[test]
    fn invalid_endpoint_is_a_config_error() {
        let mut cfg = config();
        cfg.authorization_endpoint = "not a url".into();
        assert!(authorization_url(&cfg, "S").unwrap_err().is_fatal());
    }

    #[test]
    fn begin_login_snapshots_app_parameters() {
        // GIVEN: a deep link with app parameters and a stale callback pair
        let cache = CorrelationCache::default();
        let current = QueryParams::parse("report=42&code=old&state=old");

        // WHEN
        let login = begin_login(&config(), &current, &cache, None).unwrap();

        // THEN: only the app parameters are parked under the new state
        assert_eq!(login.state.len(), 15);
        assert_eq!(
            cache.take(&login.state),
            Some(QueryParams::parse("report=42"))
        );
    }

    #[test]
    fn begin_login_without_parameters_caches_nothing() {
        let cache = CorrelationCache::default();
        begin_login(&config(), &QueryParams::new(), &cache, None).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn begin_login_invokes_renderer_with_url() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let render: LoginRenderer = Arc::new(move |url: &Url| sink.lock().push(url.to_string()));

        let login = begin_login(
            &config(),
            &QueryParams::new(),
            &CorrelationCache::default(),
            Some(&render),
        )
        .unwrap();

        assert_eq!(*seen.lock(), vec![login.url.to_string()]);
        assert_eq!(
            login.url.query_pairs().find(|(k, _)| k == "state").unwrap().1,
            login.state
        );
    }

    #[test]
    fn login_link_escapes_url() {
        let html = login_link_html("https://idp/authorize?a=1&b=\"x\"");
        assert_eq!(
            html,
            r#"<a href="https://idp/authorize?a=1&amp;b=&quot;x&quot;" target="_self">Login</a>"#
        );
    }
}
