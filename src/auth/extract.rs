use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};

use crate::auth::session::SessionClaims;
use crate::error::AppError;
use crate::AppState;

/// Session of the caller; rejects the request with 401 when there is none.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub claims: SessionClaims,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalError("application state not configured".into()))?;

    let claims = state.auth_service.sessions().require_auth(req)?;
    Ok(AuthenticatedUser {
        id: claims.user_id()?,
        claims,
    })
}
