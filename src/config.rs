//! Configuration management
//!
//! Settings are merged from an optional YAML file and `OAUTH_GATE_`-prefixed
//! environment variables. Provider settings live in named blocks under
//! `oauth:`; the block called `oauth` is used when no name is given.

use std::{collections::HashMap, env, fmt, path::Path, sync::LazyLock, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of the provider block used when the caller does not pick one.
pub const DEFAULT_BLOCK: &str = "oauth";

/// Claim-bearing field of the token response used when `token_name` is unset.
pub const DEFAULT_TOKEN_NAME: &str = "access_token";

/// Keys every provider block must define before any network call is made.
pub const REQUIRED_KEYS: [&str; 7] = [
    "authorization_endpoint",
    "token_endpoint",
    "jwks_uri",
    "redirect_uri",
    "client_id",
    "client_secret",
    "scope",
];

/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static regex is valid")
});

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Demo server configuration
    pub server: ServerConfig,
    /// Outbound HTTP configuration
    pub http: HttpSettings,
    /// Cache lifetimes
    pub cache: CacheSettings,
    /// Named provider blocks
    pub oauth: HashMap<String, OAuthConfig>,
}

/// Demo server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Sessions idle for longer than this are dropped
    #[serde(with = "humantime_serde")]
    pub session_idle: Duration,
    /// Mark the session cookie `Secure` (needs HTTPS in front)
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            session_idle: Duration::from_secs(3600),
            secure_cookies: false,
        }
    }
}

/// Timeouts applied to the token exchange and JWKS fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Total request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TCP/TLS connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifetimes of the two process-wide caches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// How long a login-time query snapshot waits for its callback
    #[serde(with = "humantime_serde")]
    pub state_ttl: Duration,
    /// How long a fetched key set is trusted
    #[serde(with = "humantime_serde")]
    pub jwks_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            state_ttl: Duration::from_secs(300),
            jwks_ttl: Duration::from_secs(100 * 3600),
        }
    }
}

/// One identity provider's client settings.
///
/// Required fields default to the empty string so that an incomplete block
/// still parses; [`validate_config`] reports it instead.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Provider URL the browser is sent to
    pub authorization_endpoint: String,
    /// Provider URL the code is exchanged at
    pub token_endpoint: String,
    /// Provider's JSON Web Key Set document
    pub jwks_uri: String,
    /// Where the provider sends the browser back to
    pub redirect_uri: String,
    /// Registered client ID
    pub client_id: String,
    /// Registered client secret (supports `${VAR}`)
    pub client_secret: String,
    /// Scope string passed through verbatim
    pub scope: String,
    /// Expected `aud` claim; audience is not checked when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Claim reported as the user's identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_field_in_token: Option<String>,
    /// Field of the token response holding the JWT
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("jwks_uri", &self.jwks_uri)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scope", &self.scope)
            .field("audience", &self.audience)
            .field("identity_field_in_token", &self.identity_field_in_token)
            .field("token_name", &self.token_name)
            .finish()
    }
}

impl OAuthConfig {
    /// Field of the token response that carries the signed JWT
    #[must_use]
    pub fn token_name(&self) -> &str {
        self.token_name.as_deref().unwrap_or(DEFAULT_TOKEN_NAME)
    }

    /// Required keys that are absent or empty, in declaration order
    #[must_use]
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let values = [
            &self.authorization_endpoint,
            &self.token_endpoint,
            &self.jwks_uri,
            &self.redirect_uri,
            &self.client_id,
            &self.client_secret,
            &self.scope,
        ];
        REQUIRED_KEYS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Fail with a user-visible [`Error::Config`] naming the missing keys
    pub fn ensure_valid(&self) -> Result<()> {
        let missing = self.missing_keys();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Invalid OAuth configuration, missing: {}",
                missing.join(", ")
            )))
        }
    }

    fn expand_env_vars(&mut self) {
        for value in [
            &mut self.authorization_endpoint,
            &mut self.token_endpoint,
            &mut self.jwks_uri,
            &mut self.redirect_uri,
            &mut self.client_id,
            &mut self.client_secret,
            &mut self.scope,
        ] {
            *value = expand_string(value);
        }
        for value in [
            &mut self.audience,
            &mut self.identity_field_in_token,
            &mut self.token_name,
        ]
        .into_iter()
        .flatten()
        {
            *value = expand_string(value);
        }
    }
}

/// True iff every required key is present and non-empty. No side effects.
#[must_use]
pub fn validate_config(config: &OAuthConfig) -> bool {
    config.missing_keys().is_empty()
}

impl Settings {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("OAUTH_GATE_").split("__"));

        let mut settings: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files first so ${VAR} can refer to them
        settings.load_env_files();
        settings.expand_env_vars();

        Ok(settings)
    }

    /// Provider block by name, or the `oauth` block when `name` is `None`
    pub fn oauth_block(&self, name: Option<&str>) -> Result<&OAuthConfig> {
        let name = name.unwrap_or(DEFAULT_BLOCK);
        self.oauth.get(name).ok_or_else(|| {
            Error::Config(format!("OAuth configuration block '{name}' not found"))
        })
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    fn expand_env_vars(&mut self) {
        self.server.host = expand_string(&self.server.host);
        for block in self.oauth.values_mut() {
            block.expand_env_vars();
        }
    }
}

/// Expand environment variables in a string
fn expand_string(value: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

/// Human-readable `Duration` serde helpers ("250ms", "30s", "5m", "100h")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration as whole seconds ("30s"), or milliseconds ("250ms")
    /// when it has a sub-second part
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a duration string; a bare number means seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        // "ms" before "s" and "m"
        let (value, scale) = if let Some(ms) = s.strip_suffix("ms") {
            return number(ms).map(Duration::from_millis);
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            (s, 1)
        };
        number(value)?
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {s}"))
    }

    fn number(s: &str) -> Result<u64, String> {
        s.parse::<u64>()
            .map_err(|e| format!("invalid duration '{s}': {e}"))
    }
}
