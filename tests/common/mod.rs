//! In-process identity provider for integration tests
//!
//! Serves a token endpoint and a JWKS endpoint on `127.0.0.1:0`, counting
//! requests to each and recording the last token request form.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use oauth_gate::OAuthConfig;

pub const IDP_KEY_PEM: &[u8] = include_bytes!("../fixtures/idp_signing_key.pem");
pub const ROGUE_KEY_PEM: &[u8] = include_bytes!("../fixtures/rogue_signing_key.pem");
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");
pub const IDP_KID: &str = "idp-key-1";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn sign(claims: &Value, pem: &[u8], kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

/// What the token endpoint answers with
#[derive(Debug, Clone)]
pub enum TokenReply {
    /// 200 with `access_token` signed by the published key
    Signed(Value),
    /// 200 with `access_token` signed by `pem` under `kid`
    SignedWith { claims: Value, pem: &'static [u8], kid: &'static str },
    /// Error status with a JSON error body
    Status(u16),
}

#[derive(Default)]
struct IdpState {
    token_hits: AtomicUsize,
    jwks_hits: AtomicUsize,
    last_form: Mutex<Option<HashMap<String, String>>>,
    reply: Mutex<Option<TokenReply>>,
}

pub struct MockIdp {
    pub base_url: String,
    state: Arc<IdpState>,
    handle: JoinHandle<()>,
}

impl MockIdp {
    pub async fn start() -> Self {
        let state = Arc::new(IdpState::default());
        *state.reply.lock() = Some(TokenReply::Signed(default_claims()));

        let app = Router::new()
            .route("/token", post(token_handler))
            .route("/jwks", get(jwks_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    pub fn reply_with(&self, reply: TokenReply) {
        *self.state.reply.lock() = Some(reply);
    }

    pub fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }

    pub fn jwks_hits(&self) -> usize {
        self.state.jwks_hits.load(Ordering::SeqCst)
    }

    pub fn last_form(&self) -> Option<HashMap<String, String>> {
        self.state.last_form.lock().clone()
    }

    /// A complete provider block pointing at this server
    pub fn config(&self) -> OAuthConfig {
        OAuthConfig {
            authorization_endpoint: "https://idp.example.com/oauth2/authorize".into(),
            token_endpoint: format!("{}/token", self.base_url),
            jwks_uri: format!("{}/jwks", self.base_url),
            redirect_uri: "https://app.example.com/".into(),
            client_id: "app-123".into(),
            client_secret: "s3cret".into(),
            scope: "openid email".into(),
            identity_field_in_token: Some("email".into()),
            ..Default::default()
        }
    }
}

impl Drop for MockIdp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn default_claims() -> Value {
    json!({ "sub": "u1", "email": "ada@example.com", "exp": now() + 600 })
}

async fn token_handler(
    State(state): State<Arc<IdpState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_form.lock() = Some(form);

    let reply = state.reply.lock().clone();
    let jwt = match reply {
        Some(TokenReply::Signed(claims)) => sign(&claims, IDP_KEY_PEM, IDP_KID),
        Some(TokenReply::SignedWith { claims, pem, kid }) => sign(&claims, pem, kid),
        Some(TokenReply::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap();
            return (status, Json(json!({ "error": "invalid_grant" }))).into_response();
        }
        None => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    Json(json!({
        "access_token": jwt,
        "token_type": "Bearer",
        "expires_in": 600
    }))
    .into_response()
}

async fn jwks_handler(State(state): State<Arc<IdpState>>) -> impl IntoResponse {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "application/json")], JWKS_JSON)
}
