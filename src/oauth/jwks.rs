//! JWKS key provider
//!
//! Fetches a provider's JSON Web Key Set lazily and caches it per `jwks_uri`
//! for a long window (100 hours by default), so validating a session does not
//! cost a network round-trip. A `kid` that is not in the cached set triggers a
//! single refresh before the lookup fails, which covers key rotation inside
//! the cache window without re-fetching forever for a key that truly does not
//! exist.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, JwkSet},
};
use tracing::debug;

use crate::clock::{Clock, system_clock};
use crate::{Error, Result};

/// Default lifetime of a fetched key set (100 hours)
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(100 * 3600);

/// Cached JWKS entry.
struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// JWKS cache with one entry per `jwks_uri`, shared read-only by all sessions.
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwksCache {
    /// Create a cache that fetches through `http`
    #[must_use]
    pub fn new(http: reqwest::Client, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: DashMap::new(),
            http,
            ttl,
            clock,
        }
    }

    /// Create with the default TTL and the system clock
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self::new(http, DEFAULT_JWKS_TTL, system_clock())
    }

    fn is_stale(&self, cached: &CachedJwks) -> bool {
        self.clock.now().duration_since(cached.fetched_at) >= self.ttl
    }

    /// Seed the cache for `jwks_uri` with a known key set
    pub fn insert(&self, jwks_uri: &str, keys: JwkSet) {
        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: Arc::new(keys),
                fetched_at: self.clock.now(),
            },
        );
    }

    /// Return the cached JWKS for `jwks_uri`, or fetch it if absent or stale.
    ///
    /// If `force_refresh` is `true`, the cache is bypassed regardless of TTL.
    pub async fn get_or_fetch(&self, jwks_uri: &str, force_refresh: bool) -> Result<Arc<JwkSet>> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if !self.is_stale(&cached) {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(jwks_uri = %jwks_uri, "Fetching JWKS");
        let jwks: JwkSet = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::Jwks(format!("Failed to fetch {jwks_uri}: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Jwks(format!("Failed to parse key set from {jwks_uri}: {e}")))?;

        let keys = Arc::new(jwks);
        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: self.clock.now(),
            },
        );

        Ok(keys)
    }

    /// Find a decoding key by `kid`, refreshing the cached set once if not found.
    pub async fn signing_key(&self, jwks_uri: &str, kid: &str) -> Result<DecodingKey> {
        let jwks = self.get_or_fetch(jwks_uri, false).await?;
        if let Some(key) = find_key_in_jwks(&jwks, kid) {
            return Ok(key);
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = self.get_or_fetch(jwks_uri, true).await?;
        find_key_in_jwks(&jwks, kid)
            .ok_or_else(|| Error::Jwks(format!("Unable to find a signing key that matches: {kid}")))
    }

    /// Resolve the key that signed `token`, matched by the `kid` in its header
    pub async fn signing_key_for_token(&self, jwks_uri: &str, token: &str) -> Result<DecodingKey> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| Error::Jwks("JWT missing 'kid' field in header".to_string()))?;
        self.signing_key(jwks_uri, &kid).await
    }

    /// Number of cached key sets
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no key set is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Find an RSA JWK by `kid` in a `JwkSet` and convert it to a `DecodingKey`.
fn find_key_in_jwks(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
    jwks.keys
        .iter()
        .filter(|jwk| jwk.common.key_id.as_deref() == Some(kid))
        .find_map(|jwk| match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
            _ => None,
        })
}
