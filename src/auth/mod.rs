//! Caller identity for HTTP requests
//!
//! Production requests carry an HS256 bearer token. In dev mode the
//! `X-User-Id` / `X-User-Role` headers are accepted as well so the API can
//! be driven without a token issuer.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};

use hyper::header::{HeaderMap, AUTHORIZATION};
use tracing::debug;

use crate::config::Args;
use crate::deals::UserContext;
use crate::types::{DealError, Result};

pub const DEV_USER_HEADER: &str = "X-User-Id";
pub const DEV_ROLE_HEADER: &str = "X-User-Role";

pub struct Authenticator {
    jwt: Option<JwtValidator>,
    dev_mode: bool,
}

impl Authenticator {
    pub fn new(jwt: Option<JwtValidator>, dev_mode: bool) -> Self {
        Self { jwt, dev_mode }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let jwt = match args.jwt_secret() {
            Some(secret) if args.dev_mode => Some(JwtValidator::new_dev(secret)),
            Some(secret) => Some(JwtValidator::new(secret)?),
            None => None,
        };
        Ok(Self::new(jwt, args.dev_mode))
    }

    /// Resolve the caller, or `Unauthorized`
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<UserContext> {
        if self.dev_mode {
            if let Some(user) = dev_identity(headers) {
                debug!("Dev identity {} ({})", user.uid, user.role);
                return Ok(user);
            }
        }

        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let token = extract_token_from_header(header)
            .ok_or_else(|| DealError::Unauthorized("authentication required".to_string()))?;
        let validator = self
            .jwt
            .as_ref()
            .ok_or_else(|| DealError::Unauthorized("token verification unavailable".to_string()))?;
        validator.verify_token(token)
    }
}

fn dev_identity(headers: &HeaderMap) -> Option<UserContext> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let uid = header(DEV_USER_HEADER)?;
    let role = header(DEV_ROLE_HEADER).unwrap_or("user");
    Some(UserContext::new(uid, role))
}
