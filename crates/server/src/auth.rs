//! Password hashing, bearer tokens and the authenticated-user extractor.
//!
//! A request is authenticated only when its JWT verifies, names an existing
//! user, and is still active in the `tokens` table. Logging out flips that
//! row, so a signed but revoked token is rejected.

use std::sync::Arc;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use iot_panel_db::UserRow;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub name: String,
    pub email: String,
    /// Unix seconds.
    pub exp: i64,
    /// Unique per issue so two logins in the same second get distinct tokens.
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// HS256 signing material plus token lifetime.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::minutes(expire_minutes),
        }
    }

    pub fn issue(&self, user: &UserRow) -> ApiResult<IssuedToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.lifetime;
        let claims = Claims {
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;
        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    /// Check signature and expiry. Says nothing about revocation.
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::Unauthorized(format!("token expired or invalid: {e}")))
    }
}

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// `false` for a wrong password and for an unparseable hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Resolve a raw token to its user.
pub async fn authenticate(state: &AppState, token: &str) -> ApiResult<UserRow> {
    let claims = state.keys.verify(token)?;
    let user = state
        .db
        .get_user_by_username(&claims.username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", claims.username)))?;
    if state.db.get_active_token(token).await?.is_none() {
        return Err(ApiError::Unauthorized("token inactive".into()));
    }
    Ok(user)
}

/// The caller of a protected route.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: UserRow,
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?
            .to_string();
        let user = authenticate(state, &token).await?;
        Ok(AuthUser { user, token })
    }
}
