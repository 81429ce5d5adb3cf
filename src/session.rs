use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config;

/// Authenticated caller carried as a request extension: identity, tenant
/// code, preferred language. Routes that work without one see no extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub code: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(principal: &Principal) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        Self {
            sub: principal.uid.clone(),
            code: principal.code.clone(),
            lang: principal.lang.clone(),
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            code: claims.code,
            lang: claims.lang,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

pub fn issue_token(principal: &Principal) -> Result<String, SessionError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    let claims = Claims::new(principal);
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

pub fn verify_token(token: &str) -> Result<Principal, SessionError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(Principal::from(data.claims))
}

/// Attaches a `Principal` extension when a valid bearer token is present.
/// Absent or invalid tokens pass through unauthenticated; what requires an
/// identity is decided where the identity is used.
pub async fn session_middleware(headers: HeaderMap, mut request: Request, next: Next) -> Response {
    if let Some(token) = bearer_token(&headers) {
        match verify_token(&token) {
            Ok(principal) => {
                request.extensions_mut().insert(principal);
            }
            Err(error) => {
                debug!(target: "app", "session token rejected: {}", error);
            }
        }
    }
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
