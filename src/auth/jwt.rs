//! JWT bearer token verification
//!
//! Tokens are HS256 signed. The `sub` claim is the caller's uid and `role`
//! its platform role (`admin`, `agent`, `client`, ...).

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::MIN_JWT_SECRET_LEN;
use crate::deals::UserContext;
use crate::types::DealError;

/// Payload stored in a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Platform role
    #[serde(default)]
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl From<Claims> for UserContext {
    fn from(claims: Claims) -> Self {
        UserContext::new(claims.sub, claims.role)
    }
}

#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
}

impl JwtValidator {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String) -> Result<Self, DealError> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(DealError::Internal(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        Ok(Self { secret })
    }

    /// Validator for dev mode; accepts any non-empty secret
    pub fn new_dev(secret: String) -> Self {
        Self { secret }
    }

    /// Sign a token for `user`, valid for `ttl_seconds`
    pub fn issue_token(&self, user: &UserContext, ttl_seconds: u64) -> Result<String, DealError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DealError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user.uid.clone(),
            role: user.role.clone(),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| DealError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature and expiry and return the caller identity
    pub fn verify_token(&self, token: &str) -> Result<UserContext, DealError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            };
            DealError::Unauthorized(msg.to_string())
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(DealError::Unauthorized("Token has no subject".to_string()));
        }
        Ok(data.claims.into())
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}
