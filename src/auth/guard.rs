use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpResponse};
use tracing::{debug, warn};

use crate::AppState;

pub const LOGIN_PATH: &str = "/login";

const PUBLIC_PATHS: &[&str] = &[
    LOGIN_PATH,
    "/health",
    "/favicon.ico",
    "/api/auth/login",
    "/api/auth/verify-2fa",
];

const PUBLIC_PREFIXES: &[&str] = &["/static/"];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Every path outside the public allow-list needs a valid session cookie,
/// otherwise the browser is sent to the login page.
///
/// `two_factor_verified` is not checked: accounts with a second factor only
/// ever receive a session after the code step.
pub async fn route_guard<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    if is_public(req.path()) {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        warn!("Route guard running without application state");
        return Ok(redirect_to_login(req));
    };

    let sessions = state.auth_service.sessions();
    let claims = match sessions.session_status(req.request()).into_claims() {
        Some(claims) => claims,
        None => {
            debug!(path = req.path(), "No valid session, redirecting to login");
            return Ok(redirect_to_login(req));
        }
    };

    let refreshed = if sessions.needs_refresh(&claims) {
        sessions.refresh_session(req.request())?
    } else {
        None
    };

    let mut res = next.call(req).await?;
    if let Some(cookie) = refreshed {
        res.response_mut().add_cookie(&cookie)?;
    }
    Ok(res.map_into_left_body())
}

fn redirect_to_login<B>(req: ServiceRequest) -> ServiceResponse<EitherBody<B>> {
    let response = HttpResponse::TemporaryRedirect()
        .insert_header((header::LOCATION, LOGIN_PATH))
        .finish();
    req.into_response(response).map_into_right_body()
}
