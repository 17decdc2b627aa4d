//! Demonstration host
//!
//! A small axum application guarding `GET /` with [`SessionManager`].
//! Sessions are kept by `tower-sessions` in process memory and expire after
//! a period of inactivity.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info};

use crate::config::{OAuthConfig, ServerConfig, Settings};
use crate::oauth::{
    AuthOutcome, QueryParams, SESSION_TOKEN_KEY, SessionManager, SessionStore, escape_html,
    login_link_html,
};
use crate::{Error, Result};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "oauth_gate_sid";

/// Shared application state
pub struct AppState {
    manager: SessionManager,
    config: OAuthConfig,
}

impl AppState {
    /// Serve the provider block `config` through `manager`
    #[must_use]
    pub fn new(manager: SessionManager, config: OAuthConfig) -> Self {
        Self { manager, config }
    }
}

/// [`SessionStore`] view of one request's `tower_sessions::Session`.
///
/// The token is read when the request starts. Writes are staged and applied
/// by [`RequestSession::commit`], so a request that only reads leaves the
/// stored session untouched.
pub struct RequestSession {
    session: Session,
    values: HashMap<String, Value>,
    writes: HashMap<String, Option<Value>>,
}

impl RequestSession {
    /// Read the token key from `session`
    pub async fn load(session: Session) -> Result<Self> {
        let mut values = HashMap::new();
        if let Some(token) = session
            .get::<Value>(SESSION_TOKEN_KEY)
            .await
            .map_err(session_error)?
        {
            values.insert(SESSION_TOKEN_KEY.to_string(), token);
        }
        Ok(Self {
            session,
            values,
            writes: HashMap::new(),
        })
    }

    /// Whether any write is waiting for [`RequestSession::commit`]
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.writes.is_empty()
    }

    /// Apply staged writes to the underlying session
    pub async fn commit(self) -> Result<()> {
        for (key, value) in self.writes {
            match value {
                Some(value) => self
                    .session
                    .insert(&key, value)
                    .await
                    .map_err(session_error)?,
                None => {
                    self.session
                        .remove::<Value>(&key)
                        .await
                        .map_err(session_error)?;
                }
            }
        }
        Ok(())
    }
}

impl SessionStore for RequestSession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value.clone());
        self.writes.insert(key.to_string(), Some(value));
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.writes.insert(key.to_string(), None);
        self.values.remove(key)
    }
}

fn session_error(e: tower_sessions::session::Error) -> Error {
    Error::Session(e.to_string())
}

/// Cookie session layer: in-memory store, inactivity expiry, `Lax` cookie
pub fn session_layer(server: &ServerConfig) -> SessionManagerLayer<MemoryStore> {
    let idle = time::Duration::try_from(server.session_idle).unwrap_or(time::Duration::HOUR);
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_path("/")
        .with_expiry(Expiry::OnInactivity(idle))
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_secure(server.secure_cookies)
}

/// Create the router
pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/logout", get(logout_handler).post(logout_handler))
        .route("/health", get(health_handler))
        .layer(session_layer(server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the provider block, bind the configured address and serve until
/// Ctrl+C or SIGTERM.
pub async fn run(settings: &Settings, provider: Option<&str>) -> Result<()> {
    let config = settings.oauth_block(provider)?.clone();
    config.ensure_valid()?;

    let manager = SessionManager::from_settings(settings)?;
    let app = create_router(Arc::new(AppState::new(manager, config)), &settings.server);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid server address: {e}")))?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "OAuth gate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

/// GET / - the guarded page
async fn index_handler(
    State(state): State<Arc<AppState>>,
    session: Session,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = QueryParams::parse(raw.as_deref().unwrap_or_default());
    match guard(&state, &session, &query).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Authentication failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page(&e.to_string())),
            )
                .into_response()
        }
    }
}

async fn guard(state: &AppState, session: &Session, query: &QueryParams) -> Result<Response> {
    let mut store = RequestSession::load(session.clone()).await?;
    let outcome = state
        .manager
        .authenticate(&state.config, query, &mut store)
        .await?;
    store.commit().await?;

    let response = match outcome {
        // Fresh login: new session id, and code/state dropped from the address bar
        AuthOutcome::Authenticated {
            restored_query: Some(restored),
            ..
        } => {
            session.cycle_id().await.map_err(session_error)?;
            if restored.is_empty() {
                Redirect::to("/").into_response()
            } else {
                Redirect::to(&format!("/?{}", restored.to_query_string())).into_response()
            }
        }
        AuthOutcome::Authenticated { identity, .. } => {
            Html(authenticated_page(&identity, query)).into_response()
        }
        AuthOutcome::LoginRequired { login, notice } => Html(login_page(
            login.url.as_str(),
            notice.map(|n| n.to_string()).as_deref(),
        ))
        .into_response(),
    };
    Ok(response)
}

/// GET|POST /logout
async fn logout_handler(State(state): State<Arc<AppState>>, session: Session) -> Redirect {
    if let Err(e) = end_session(&state, session).await {
        error!(error = %e, "Logout failed");
    }
    Redirect::to("/")
}

async fn end_session(state: &AppState, session: Session) -> Result<()> {
    let mut store = RequestSession::load(session).await?;
    state.manager.logout(&mut store);
    store.commit().await
}

/// GET /health
async fn health_handler() -> &'static str {
    "ok"
}

fn login_page(login_url: &str, notice: Option<&str>) -> String {
    let notice = notice
        .map(|n| format!("<p class=\"notice\">{}</p>\n        ", escape_html(n)))
        .unwrap_or_default();
    page(
        "Sign in",
        &format!("{notice}<p>{}</p>", login_link_html(login_url)),
    )
}

fn authenticated_page(identity: &str, query: &QueryParams) -> String {
    let params: String = query
        .pairs()
        .map(|(k, v)| format!("<li><code>{}</code> = {}</li>", escape_html(k), escape_html(v)))
        .collect();
    let params = if params.is_empty() {
        String::new()
    } else {
        format!("<ul>{params}</ul>\n        ")
    };
    page(
        "Signed in",
        &format!(
            "<p>Signed in as <strong>{}</strong></p>\n        {params}<form method=\"post\" action=\"/logout\"><button type=\"submit\">Logout</button></form>",
            escape_html(identity)
        ),
    )
}

fn error_page(message: &str) -> String {
    page(
        "Configuration error",
        &format!("<p class=\"notice\">{}</p>", escape_html(message)),
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 480px;
            margin: 4rem auto;
        }}
        .notice {{ color: #c0392b; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="container">
        {body}
    </div>
</body>
</html>"#
    )
}
