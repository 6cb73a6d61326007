//! Bearer-token authentication for the coverage API.
//!
//! Tokens are HS256 JWTs carrying the caller's user id, role, and organization. Handlers take
//! an [`AuthenticatedUser`] argument; the extractor finds the [`TokenVerifier`] in the request
//! extensions.
//!
//! The SMS vendor cannot hold a user token, so its callback carries a shared secret in the
//! [`WEBHOOK_SECRET_HEADER`] header instead, checked by [`VerifiedWebhook`].

use std::fmt;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::workflows::coverage::{Actor, OrganizationId, StaffId, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingAuthHeader,
    #[error("authorization header must be a bearer token")]
    InvalidAuthFormat,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("missing or invalid webhook secret")]
    InvalidWebhookSecret,
    #[error("token verifier is not configured")]
    NotConfigured,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        let payload = json!({ "error": self.to_string() });
        (status, axum::Json(payload)).into_response()
    }
}

/// Registered and private claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub role: UserRole,
    /// Organization id.
    pub org: String,
    /// Expiry as a Unix timestamp.
    pub exp: i64,
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Actor {
            id: StaffId(claims.sub),
            organization_id: OrganizationId(claims.org),
            role: claims.role,
        }
    }
}

/// Signs and checks HS256 access tokens with a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|err| {
            warn!(error = %err, "rejected access token");
            AuthError::InvalidToken(err)
        })?;
        debug!(user_id = %data.claims.sub, role = data.claims.role.label(), "access token accepted");
        Ok(data.claims)
    }

    /// Mint a token for `actor`. Used by the demo command and tests; production tokens come
    /// from the identity provider.
    pub fn issue(&self, actor: &Actor, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: actor.id.to_string(),
            role: actor.role,
            org: actor.organization_id.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }
}

pub fn extract_bearer_token(header: &HeaderValue) -> Result<&str, AuthError> {
    let raw = header.to_str().map_err(|_| AuthError::InvalidAuthFormat)?;
    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidAuthFormat)
}

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verifier = parts
            .extensions
            .get::<Arc<TokenVerifier>>()
            .cloned()
            .ok_or(AuthError::NotConfigured)?;
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?;
        let claims = verifier.verify(extract_bearer_token(header)?)?;
        Ok(AuthenticatedUser(claims.into()))
    }
}

/// Header the SMS vendor is configured to send with every callback.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Checks the shared secret on inbound vendor callbacks.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();
        if !self.secret.is_empty() && secrets_match(presented.as_bytes(), self.secret.as_bytes()) {
            Ok(())
        } else {
            warn!("rejected webhook without a valid secret");
            Err(AuthError::InvalidWebhookSecret)
        }
    }
}

// compares every byte so the time taken does not depend on where the first mismatch is
fn secrets_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// Marker extractor for vendor callbacks that carried the configured secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedWebhook;

#[axum::async_trait]
impl<S> FromRequestParts<S> for VerifiedWebhook
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verifier = parts
            .extensions
            .get::<Arc<WebhookVerifier>>()
            .cloned()
            .ok_or(AuthError::NotConfigured)?;
        verifier.verify(&parts.headers)?;
        Ok(VerifiedWebhook)
    }
}
