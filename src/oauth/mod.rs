//! Browser-delegated OAuth 2.0 Authorization Code login
//!
//! Features:
//! - Opaque state tokens correlating a login with its callback
//! - Deep-link parameters parked across the redirect round trip
//! - Code-for-token exchange against the provider's token endpoint
//! - RS256 JWT validation with keys from a cached JWKS
//! - Session lifecycle: initiate, callback, validate, logout

mod authorize;
mod correlation;
mod exchange;
mod jwks;
mod manager;
mod query;
mod session;
mod state;
mod validate;

pub use authorize::{
    LoginRenderer, LoginRequest, authorization_url, begin_login, escape_html, login_link_html,
};
pub use correlation::{CorrelationCache, DEFAULT_STATE_TTL};
pub use exchange::{SessionToken, TokenClient};
pub use jwks::{DEFAULT_JWKS_TTL, JwksCache};
pub use manager::{AuthOutcome, Notice, SessionManager, build_http_client};
pub use query::{CALLBACK_KEYS, QueryParams};
pub use session::{MemorySession, SESSION_TOKEN_KEY, SessionStore};
pub use state::{STATE_ALPHABET, STATE_LEN, generate_state};
pub use validate::{TokenStatus, TokenValidator, UNMAPPED_IDENTITY, verify_jwt};
