use std::sync::Arc;

use actix_web::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use actix_web::cookie::{Cookie, SameSite};
use actix_web::HttpRequest;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::token::{TokenCodec, TokenStatus};
use crate::error::{AppError, AuthError};

pub const SESSION_COOKIE: &str = "crm_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Credential id.
    pub sub: String,
    pub name: String,
    pub two_factor_verified: bool,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::AuthError(AuthError::Unauthorized))
    }
}

/// The signed cookie is the only record of a session. There is no
/// server-side table, so a session cannot be revoked before it expires.
#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    ttl: Duration,
    refresh_after: Duration,
    secure: bool,
}

impl SessionManager {
    pub fn new(codec: Arc<TokenCodec>, ttl: Duration, refresh_after: Duration, secure: bool) -> Self {
        Self {
            codec,
            ttl,
            refresh_after,
            secure,
        }
    }

    pub fn create_session(
        &self,
        user_id: i64,
        display_name: &str,
        two_factor_verified: bool,
    ) -> Result<Cookie<'static>, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            name: display_name.to_string(),
            two_factor_verified,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.issue(&claims)
    }

    pub fn get_session(&self, req: &HttpRequest) -> Option<SessionClaims> {
        self.session_status(req).into_claims()
    }

    pub fn session_status(&self, req: &HttpRequest) -> TokenStatus<SessionClaims> {
        let cookie = req.cookie(SESSION_COOKIE);
        self.codec.decode(cookie.as_ref().map(|c| c.value()))
    }

    /// Re-signs a valid session with a fresh expiry. `None` when the request
    /// carries no valid session.
    pub fn refresh_session(&self, req: &HttpRequest) -> Result<Option<Cookie<'static>>, AppError> {
        let Some(claims) = self.get_session(req) else {
            return Ok(None);
        };

        let now = Utc::now();
        let refreshed = SessionClaims {
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            ..claims
        };
        self.issue(&refreshed).map(Some)
    }

    pub fn needs_refresh(&self, claims: &SessionClaims) -> bool {
        Utc::now().timestamp() - claims.iat >= self.refresh_after.num_seconds()
    }

    pub fn destroy_session(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(CookieDuration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .finish()
    }

    pub fn require_auth(&self, req: &HttpRequest) -> Result<SessionClaims, AppError> {
        match self.get_session(req) {
            Some(claims) if !claims.sub.is_empty() => Ok(claims),
            _ => Err(AuthError::Unauthorized.into()),
        }
    }

    fn issue(&self, claims: &SessionClaims) -> Result<Cookie<'static>, AppError> {
        let token = self.codec.sign(claims)?;
        let expires = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| AppError::InternalError(format!("invalid session expiry: {}", e)))?;

        Ok(Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(CookieDuration::seconds(self.ttl.num_seconds()))
            .expires(expires)
            .finish())
    }
}
