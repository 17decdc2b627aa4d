//! Per-session storage
//!
//! The host owns session persistence. The manager only needs a key/value view
//! of the current user's session, and only ever touches one key.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use super::exchange::SessionToken;

/// Session key under which the token response is kept
pub const SESSION_TOKEN_KEY: &str = "oauth_gate.token";

/// Key/value view of one user's session
pub trait SessionStore {
    /// Value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`
    fn set(&mut self, key: &str, value: Value);

    /// Remove `key`, returning what was stored
    fn remove(&mut self, key: &str) -> Option<Value>;

    /// The stored session token. A value that no longer parses is discarded.
    fn token(&mut self) -> Option<SessionToken> {
        let value = self.get(SESSION_TOKEN_KEY)?;
        match serde_json::from_value(value) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session token");
                self.remove(SESSION_TOKEN_KEY);
                None
            }
        }
    }

    /// Persist `token` for the rest of the session
    fn store_token(&mut self, token: &SessionToken) {
        self.set(SESSION_TOKEN_KEY, Value::Object(token.fields().clone()));
    }

    /// Forget the token; returns whether one was stored
    fn clear_token(&mut self) -> bool {
        self.remove(SESSION_TOKEN_KEY).is_some()
    }

    /// Whether a token is stored (valid or not)
    fn has_token(&self) -> bool {
        self.get(SESSION_TOKEN_KEY).is_some()
    }
}

/// Session held in process memory
#[derive(Debug, Default, Clone)]
pub struct MemorySession {
    values: HashMap<String, Value>,
}

impl MemorySession {
    /// Empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}
