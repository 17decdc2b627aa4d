//! Shared fixtures for unit tests: an RSA signing key published in a JWKS,
//! a second key the provider never published, and a provider block pointing
//! at an unroutable address so accidental network calls fail fast.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
use serde_json::Value;

use crate::config::OAuthConfig;
use crate::oauth::JwksCache;

pub const IDP_KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/idp_signing_key.pem");
pub const ROGUE_KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/rogue_signing_key.pem");
pub const JWKS_JSON: &str = include_str!("../tests/fixtures/jwks.json");
pub const IDP_KID: &str = "idp-key-1";
pub const JWKS_URI: &str = "http://127.0.0.1:9/jwks";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn sign(claims: &Value, pem: &[u8], kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem).expect("fixture key parses");
    jsonwebtoken::encode(&header, claims, &key).expect("fixture token signs")
}

pub fn idp_token(claims: &Value) -> String {
    sign(claims, IDP_KEY_PEM, Some(IDP_KID))
}

pub fn seeded_jwks() -> Arc<JwksCache> {
    let cache = JwksCache::with_client(reqwest::Client::new());
    let keys: JwkSet = serde_json::from_str(JWKS_JSON).expect("fixture JWKS parses");
    cache.insert(JWKS_URI, keys);
    Arc::new(cache)
}

pub fn provider_config() -> OAuthConfig {
    OAuthConfig {
        authorization_endpoint: "https://idp.example.com/oauth2/authorize".into(),
        token_endpoint: "http://127.0.0.1:9/token".into(),
        jwks_uri: JWKS_URI.into(),
        redirect_uri: "https://app.example.com/".into(),
        client_id: "app-123".into(),
        client_secret: "s3cret".into(),
        scope: "openid email".into(),
        ..Default::default()
    }
}
