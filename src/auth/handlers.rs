use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, error};
use crate::AppState;
use crate::auth::extract::AuthenticatedUser;
use crate::auth::service::LoginOutcome;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_two_factor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_token: Option<String>,
}

impl AuthResponse {
    fn ok() -> Self {
        Self { success: true, ..Self::default() }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for username: {}", req.username);
    match state.auth_service.login_user(&req.username, &req.password).await {
        Ok(LoginOutcome::Authenticated { session }) => {
            Ok(HttpResponse::Ok().cookie(session).json(AuthResponse::ok()))
        }
        Ok(LoginOutcome::TwoFactorRequired { challenge_token }) => {
            Ok(HttpResponse::Ok().json(AuthResponse {
                success: true,
                requires_two_factor: true,
                challenge_token: Some(challenge_token),
            }))
        }
        Err(e) => {
            error!("Login failed for username: {}: {}", req.username, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorRequest {
    #[serde(default)]
    pub challenge_token: String,
    #[serde(default)]
    pub code: String,
}

pub async fn verify_two_factor(
    req: web::Json<VerifyTwoFactorRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if req.challenge_token.is_empty() || req.code.trim().is_empty() {
        return Err(AppError::ValidationError("Challenge and code are required".into()));
    }

    let session = state
        .auth_service
        .verify_two_factor(&req.challenge_token, &req.code)
        .await?;
    Ok(HttpResponse::Ok().cookie(session).json(AuthResponse::ok()))
}

pub async fn logout(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(state.auth_service.sessions().destroy_session())
        .json(AuthResponse::ok())
}

pub async fn session(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(user.claims)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

pub async fn change_password(
    user: AuthenticatedUser,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth_service
        .change_password(user.id, &req.current_password, &req.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(AuthResponse::ok()))
}

pub async fn two_factor_status(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let enabled = state.auth_service.two_factor_status(user.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "enabled": enabled })))
}

pub async fn two_factor_setup(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let setup = state.auth_service.generate_two_factor_secret(user.id).await?;
    Ok(HttpResponse::Ok().json(setup))
}

#[derive(Debug, Deserialize)]
pub struct EnableTwoFactorRequest {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub code: String,
}

pub async fn enable_two_factor(
    user: AuthenticatedUser,
    req: web::Json<EnableTwoFactorRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth_service
        .enable_two_factor(user.id, &req.secret, &req.code)
        .await?;
    Ok(HttpResponse::Ok().json(AuthResponse::ok()))
}

pub async fn disable_two_factor(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.disable_two_factor(user.id).await?;
    Ok(HttpResponse::Ok().json(AuthResponse::ok()))
}

/// Mounts the auth and account endpoints under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/login", web::post().to(login))
            .route("/verify-2fa", web::post().to(verify_two_factor))
            .route("/logout", web::post().to(logout))
            .route("/session", web::get().to(session)),
    )
    .service(
        web::scope("/api/account")
            .route("/password", web::post().to(change_password))
            .route("/two-factor", web::get().to(two_factor_status))
            .route("/two-factor/setup", web::post().to(two_factor_setup))
            .route("/two-factor/enable", web::post().to(enable_two_factor))
            .route("/two-factor/disable", web::post().to(disable_two_factor)),
    );
}
