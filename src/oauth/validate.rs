//! JWT validator
//!
//! Verifies the JWT held in a session token against the provider's key set:
//! RS256 signature, expiry with no clock leeway, and audience only when one
//! is configured. The outcome is a [`TokenStatus`], never an error, because
//! every failure here sends the user back to the login link.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::exchange::SessionToken;
use super::jwks::JwksCache;
use crate::config::OAuthConfig;

/// Identity reported when no identity claim is configured or present
pub const UNMAPPED_IDENTITY: &str = "OK";

/// Result of validating a session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// Signature and claims check out; carries the user's identity
    Valid(String),
    /// The `exp` claim has passed
    ExpiredSignature,
    /// Anything else: bad signature, malformed token, unknown key, wrong audience
    Invalid(String),
}

impl TokenStatus {
    /// Whether the token was accepted
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Identity of a valid token
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Valid(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Validates session tokens with keys from a shared [`JwksCache`]
#[derive(Clone)]
pub struct TokenValidator {
    jwks: Arc<JwksCache>,
}

impl TokenValidator {
    /// Create a validator backed by `jwks`
    #[must_use]
    pub fn new(jwks: Arc<JwksCache>) -> Self {
        Self { jwks }
    }

    /// The key cache this validator reads from
    #[must_use]
    pub fn jwks(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Validate `token` for the provider described by `config`
    pub async fn validate(&self, token: &SessionToken, config: &OAuthConfig) -> TokenStatus {
        let token_name = config.token_name();
        let Some(jwt) = token.jwt(token_name) else {
            warn!(token_name = %token_name, "Token response has no JWT field");
            return TokenStatus::Invalid(format!("token response has no '{token_name}' field"));
        };

        let key = match self.jwks.signing_key_for_token(&config.jwks_uri, jwt).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "No signing key for token");
                return TokenStatus::Invalid(e.to_string());
            }
        };

        let status = verify_jwt(jwt, &key, config);
        debug!(valid = status.is_valid(), "Token validated");
        status
    }
}

/// Verify `jwt` with `key` and classify the outcome.
#[must_use]
pub fn verify_jwt(jwt: &str, key: &DecodingKey, config: &OAuthConfig) -> TokenStatus {
    match jsonwebtoken::decode::<Map<String, Value>>(jwt, key, &build_validation(config)) {
        Ok(data) => TokenStatus::Valid(identity_from_claims(
            &data.claims,
            config.identity_field_in_token.as_deref(),
        )),
        Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => TokenStatus::ExpiredSignature,
        Err(e) => TokenStatus::Invalid(e.to_string()),
    }
}

/// RS256 only, `exp` required, no leeway; audience checked only when configured.
fn build_validation(config: &OAuthConfig) -> Validation {
    let mut v = Validation::new(Algorithm::RS256);
    v.leeway = 0;
    match config.audience.as_deref().filter(|a| !a.is_empty()) {
        Some(audience) => v.set_audience(&[audience]),
        None => v.validate_aud = false,
    }
    v
}

fn identity_from_claims(claims: &Map<String, Value>, field: Option<&str>) -> String {
    match field.and_then(|f| claims.get(f)) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => UNMAPPED_IDENTITY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::test_support::{
        IDP_KID, ROGUE_KEY_PEM, idp_token, now, provider_config, seeded_jwks, sign,
    };

    fn validator() -> TokenValidator {
        TokenValidator::new(seeded_jwks())
    }

    fn session(jwt: &str) -> SessionToken {
        serde_json::from_value(json!({ "access_token": jwt, "token_type": "Bearer" })).unwrap()
    }

    #[tokio::test]
    async fn valid_token_without_identity_mapping_is_ok() {
        let jwt = idp_token(&json!({ "sub": "u1", "exp": now() + 600 }));
        let status = validator().validate(&session(&jwt), &provider_config()).await;
        assert_eq!(status, TokenStatus::Valid(UNMAPPED_IDENTITY.to_string()));
    }

    #[tokio::test]
    async fn identity_claim_is_reported() {
        let mut config = provider_config();
        config.identity_field_in_token = Some("email".into());
        let jwt = idp_token(&json!({ "email": "ada@example.com", "exp": now() + 600 }));

        let status = validator().validate(&session(&jwt), &config).await;
        assert_eq!(status.identity(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn configured_but_absent_identity_claim_falls_back() {
        let mut config = provider_config();
        config.identity_field_in_token = Some("email".into());
        let jwt = idp_token(&json!({ "sub": "u1", "exp": now() + 600 }));

        let status = validator().validate(&session(&jwt), &config).await;
        assert_eq!(status.identity(), Some(UNMAPPED_IDENTITY));
    }

    #[tokio::test]
    async fn non_string_identity_claim_is_rendered_as_json() {
        let mut config = provider_config();
        config.identity_field_in_token = Some("uid".into());
        let jwt = idp_token(&json!({ "uid": 1234, "exp": now() + 600 }));

        let status = validator().validate(&session(&jwt), &config).await;
        assert_eq!(status.identity(), Some("1234"));
    }

    #[tokio::test]
    async fn past_expiry_is_expired_signature() {
        for ago in [1, 61, 86_400] {
            let jwt = idp_token(&json!({ "sub": "u1", "exp": now() - ago }));
            let status = validator().validate(&session(&jwt), &provider_config()).await;
            assert_eq!(status, TokenStatus::ExpiredSignature, "expired {ago}s ago");
        }
    }

    #[tokio::test]
    async fn missing_expiry_is_invalid() {
        let jwt = idp_token(&json!({ "sub": "u1" }));
        let status = validator().validate(&session(&jwt), &provider_config()).await;
        assert!(matches!(status, TokenStatus::Invalid(_)));
    }

    #[tokio::test]
    async fn foreign_key_with_known_kid_is_invalid() {
        // GIVEN: a token signed by a key the provider never published
        let jwt = sign(&json!({ "exp": now() + 600 }), ROGUE_KEY_PEM, Some(IDP_KID));

        // THEN: signature verification fails
        let status = validator().validate(&session(&jwt), &provider_config()).await;
        assert!(matches!(status, TokenStatus::Invalid(_)), "{status:?}");
    }

    #[tokio::test]
    async fn unknown_kid_is_invalid() {
        let jwt = sign(&json!({ "exp": now() + 600 }), ROGUE_KEY_PEM, Some("rogue"));
        let status = validator().validate(&session(&jwt), &provider_config()).await;
        assert!(matches!(status, TokenStatus::Invalid(_)));
    }

    #[tokio::test]
    async fn hmac_token_is_invalid() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(IDP_KID.to_string());
        let jwt = jsonwebtoken::encode(
            &header,
            &json!({ "exp": now() + 600 }),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        let status = validator().validate(&session(&jwt), &provider_config()).await;
        assert!(matches!(status, TokenStatus::Invalid(_)));
    }

    #[tokio::test]
    async fn audience_is_skipped_when_not_configured() {
        let config = provider_config();
        for claims in [
            json!({ "aud": "someone-else", "exp": now() + 600 }),
            json!({ "aud": ["a", "b"], "exp": now() + 600 }),
            json!({ "exp": now() + 600 }),
        ] {
            let status = validator().validate(&session(&idp_token(&claims)), &config).await;
            assert!(status.is_valid(), "{claims} should be accepted");
        }
    }

    #[tokio::test]
    async fn audience_is_enforced_when_configured() {
        let mut config = provider_config();
        config.audience = Some("app-123".into());
        let v = validator();

        let good = idp_token(&json!({ "aud": "app-123", "exp": now() + 600 }));
        assert!(v.validate(&session(&good), &config).await.is_valid());

        let wrong = idp_token(&json!({ "aud": "other", "exp": now() + 600 }));
        assert!(matches!(
            v.validate(&session(&wrong), &config).await,
            TokenStatus::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn custom_token_name_is_used() {
        let mut config = provider_config();
        config.token_name = Some("id_token".into());
        let jwt = idp_token(&json!({ "exp": now() + 600 }));
        let token: SessionToken =
            serde_json::from_value(json!({ "access_token": "opaque", "id_token": jwt })).unwrap();

        assert!(validator().validate(&token, &config).await.is_valid());
    }

    #[tokio::test]
    async fn missing_or_malformed_token_is_invalid() {
        let v = validator();
        let empty: SessionToken = serde_json::from_value(json!({ "token_type": "Bearer" })).unwrap();
        assert!(matches!(
            v.validate(&empty, &provider_config()).await,
            TokenStatus::Invalid(reason) if reason.contains("access_token")
        ));
        assert!(matches!(
            v.validate(&session("garbage"), &provider_config()).await,
            TokenStatus::Invalid(_)
        ));
    }
}
