//! Caller identity for the payment routes.
//!
//! Tokens are issued elsewhere; this module only verifies them. A token is
//! read from the `Authorization: Bearer` header or, failing that, from the
//! `token` cookie.

use crate::errors::ServiceError;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

pub const TOKEN_COOKIE: &str = "token";
pub const STUDENT_ACCOUNT: &str = "Student";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "accountType")]
    pub account_type: String,
    pub exp: i64,
}

/// HS256 token verification.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        ServiceError::Unauthorized("Token has expired".to_string())
                    }
                    _ => ServiceError::Unauthorized("Token is invalid".to_string()),
                }
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|t| !t.is_empty())
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub account_type: String,
}

impl AuthenticatedUser {
    pub fn is_student(&self) -> bool {
        self.account_type == STUDENT_ACCOUNT
    }

    pub fn require_student(self) -> Result<Self, ServiceError> {
        if self.is_student() {
            Ok(self)
        } else {
            Err(ServiceError::Forbidden(
                "This is a protected route for students only".to_string(),
            ))
        }
    }
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.id,
            email: claims.email,
            account_type: claims.account_type,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers))
            .ok_or_else(|| ServiceError::Unauthorized("Token is missing".to_string()))?;
        let claims = JwtVerifier::from_ref(state).decode(token)?;
        Ok(claims.into())
    }
}

/// An authenticated caller with a student account.
#[derive(Debug, Clone)]
pub struct Student(pub AuthenticatedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Student
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        Ok(Student(user.require_student()?))
    }
}
